// src/core/protocol/http_response.rs

//! Implements the HTTP/1.0 response structure the gateway writes back to clients,
//! and a `tokio_util::codec` pair for encoding and decoding it.

use super::http_request::HEAD_TERMINATOR;
use crate::core::GatewayError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CONTENT_LENGTH: &str = "Content-Length";

/// The status codes the gateway can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    BadRequest,
    InternalServerError,
    NotImplemented,
    GatewayTimeout,
    VersionNotSupported,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::GatewayTimeout => 504,
            StatusCode::VersionNotSupported => 505,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::GatewayTimeout => "Gateway Timeout",
            StatusCode::VersionNotSupported => "HTTP Version Not Supported",
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            200 => Some(StatusCode::Ok),
            400 => Some(StatusCode::BadRequest),
            500 => Some(StatusCode::InternalServerError),
            501 => Some(StatusCode::NotImplemented),
            504 => Some(StatusCode::GatewayTimeout),
            505 => Some(StatusCode::VersionNotSupported),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// A complete response. `Content-Length` is always computed from the body when encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response with the default content type and CORS headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "text/plain;charset=utf-8".to_string(),
                ),
                ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            ],
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::Ok, body)
    }

    pub fn error(status: StatusCode, diagnostic: &str) -> Self {
        Self::new(status, Bytes::copy_from_slice(diagnostic.as_bytes()))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Encodes the response into a single contiguous buffer ready for the socket.
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128 + self.body.len());
        encode_into(self, &mut buf);
        buf.freeze()
    }
}

fn encode_into(item: &HttpResponse, dst: &mut BytesMut) {
    dst.extend_from_slice(b"HTTP/1.0 ");
    dst.extend_from_slice(item.status.as_u16().to_string().as_bytes());
    dst.extend_from_slice(b" ");
    dst.extend_from_slice(item.status.reason().as_bytes());
    dst.extend_from_slice(CRLF);
    for (name, value) in &item.headers {
        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            continue;
        }
        dst.extend_from_slice(name.as_bytes());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(CRLF);
    }
    dst.extend_from_slice(CONTENT_LENGTH.as_bytes());
    dst.extend_from_slice(b": ");
    dst.extend_from_slice(item.body.len().to_string().as_bytes());
    dst.extend_from_slice(HEAD_TERMINATOR);
    dst.extend_from_slice(&item.body);
    dst.extend_from_slice(CRLF);
}

/// A `tokio_util::codec` implementation for `HttpResponse`s.
///
/// The gateway only encodes; decoding is used by clients (and the test suite)
/// reading responses back off a socket.
#[derive(Debug, Default)]
pub struct HttpResponseCodec;

impl Encoder<HttpResponse> for HttpResponseCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: HttpResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_into(&item, dst);
        Ok(())
    }
}

impl Decoder for HttpResponseCodec {
    type Item = HttpResponse;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(head_len) = find_subsequence(src, HEAD_TERMINATOR) else {
            return Ok(None);
        };

        let head = std::str::from_utf8(&src[..head_len])?;
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let mut parts = status_line.splitn(3, ' ');
        let (Some(version), Some(code)) = (parts.next(), parts.next()) else {
            return Err(GatewayError::MalformedRequest(format!(
                "invalid status line '{status_line}'"
            )));
        };
        if !version.starts_with("HTTP/1.") {
            return Err(GatewayError::VersionNotSupported(version.to_string()));
        }
        let status = StatusCode::from_u16(code.parse()?).ok_or_else(|| {
            GatewayError::MalformedRequest(format!("unexpected status code '{code}'"))
        })?;

        let mut headers = Vec::new();
        let mut content_length = 0usize;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                return Err(GatewayError::MalformedRequest(format!(
                    "invalid header line '{line}'"
                )));
            };
            let (name, value) = (name.trim(), value.trim());
            if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
                content_length = value.parse()?;
            }
            headers.push((name.to_string(), value.to_string()));
        }

        let body_start = head_len + HEAD_TERMINATOR.len();
        let frame_len = body_start + content_length + CRLF.len();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }
        if &src[frame_len - CRLF.len()..frame_len] != CRLF {
            return Err(GatewayError::MalformedRequest(
                "response body is not followed by CRLF".to_string(),
            ));
        }

        let body = Bytes::copy_from_slice(&src[body_start..body_start + content_length]);
        src.advance(frame_len);
        Ok(Some(HttpResponse {
            status,
            headers,
            body,
        }))
    }
}

/// Returns the offset of the first occurrence of `needle` in `haystack`.
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
