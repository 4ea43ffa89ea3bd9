// src/core/protocol/http_request.rs

//! Parses the head of a reassembled HTTP/1.x request: request line, query
//! string and headers. Bodies are not supported.

use crate::core::GatewayError;
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

/// The sequence that ends the head of an HTTP request.
pub const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Query parameters, each key mapping to every value it was given in order.
pub type Query = HashMap<String, Vec<String>>;

/// The request methods the gateway recognizes. Anything else is answered with 501.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Connect,
}

/// The protocol versions the gateway accepts. Anything else is answered with 505.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum HttpVersion {
    #[strum(serialize = "HTTP/1.0")]
    Http10,
    #[strum(serialize = "HTTP/1.1")]
    Http11,
}

/// A parsed request head.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// The url-decoded path, without the query string.
    pub path: String,
    pub query: Query,
    pub version: HttpVersion,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Parses a complete request head (everything up to and including the empty line).
    pub fn parse(raw: &[u8]) -> Result<Self, GatewayError> {
        let text = std::str::from_utf8(raw)?;
        let head = text.strip_suffix("\r\n\r\n").ok_or_else(|| {
            GatewayError::MalformedRequest("request head is not terminated".to_string())
        })?;

        let mut lines = head.split("\r\n");
        let request_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| GatewayError::MalformedRequest("missing request line".to_string()))?;

        let mut parts = request_line.split(' ');
        let (Some(method_str), Some(target), Some(version_str), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(GatewayError::MalformedRequest(format!(
                "invalid request line '{request_line}'"
            )));
        };

        let method = method_str
            .parse::<Method>()
            .map_err(|_| GatewayError::MethodNotImplemented(method_str.to_string()))?;
        let version = version_str
            .parse::<HttpVersion>()
            .map_err(|_| GatewayError::VersionNotSupported(version_str.to_string()))?;

        if !target.starts_with('/') {
            return Err(GatewayError::MalformedRequest(format!(
                "invalid request target '{target}'"
            )));
        }
        let (path, query) = split_path_query(target)?;

        let mut headers = Vec::new();
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                return Err(GatewayError::MalformedRequest(format!(
                    "invalid header line '{line}'"
                )));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(GatewayError::MalformedRequest(
                    "header with an empty name".to_string(),
                ));
            }
            headers.push((name.to_string(), value.trim().to_string()));
        }

        Ok(Self {
            method,
            path,
            query,
            version,
            headers,
        })
    }

    /// Returns every value given for a query key.
    pub fn query_values(&self, key: &str) -> Option<&[String]> {
        self.query.get(key).map(Vec::as_slice)
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Splits `/path?a=1&b=2` into its decoded path and query map.
fn split_path_query(target: &str) -> Result<(String, Query), GatewayError> {
    let (raw_path, raw_query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (target, None),
    };

    let path = decode(raw_path)?;
    let mut query = Query::new();
    if let Some(raw_query) = raw_query {
        for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            query
                .entry(decode(key)?)
                .or_default()
                .push(decode(value)?);
        }
    }
    Ok((path, query))
}

fn decode(s: &str) -> Result<String, GatewayError> {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .map_err(|e| GatewayError::MalformedRequest(format!("invalid percent-encoding: {e}")))
}
