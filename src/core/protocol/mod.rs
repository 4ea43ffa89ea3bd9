// src/core/protocol/mod.rs

pub mod http_request;
pub mod http_response;
pub use http_request::{HttpRequest, HttpVersion, Method, Query};
pub use http_response::{HttpResponse, HttpResponseCodec, StatusCode};
