// src/core/errors.rs

//! Defines the primary error type for the gateway and its pipeline.

use crate::core::protocol::StatusCode;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures the gateway can surface.
/// Variants that reach a client map onto an HTTP status through [`GatewayError::status`].
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Malformed HTTP request: {0}")]
    MalformedRequest(String),

    #[error("The HTTP request method is not supported: {0}")]
    MethodNotImplemented(String),

    #[error("The HTTP request version is not supported: {0}")]
    VersionNotSupported(String),

    #[error("Work queue '{queue}' is full ({depth} units waiting)")]
    QueueFull { queue: String, depth: usize },

    #[error("Work queue '{0}' is closed")]
    QueueClosed(String),

    #[error("Completion event for unknown connection {0}")]
    OrphanCompletion(String),

    #[error("A request is already in flight for connection {0}")]
    DuplicateDispatch(String),

    #[error("Stage '{stage}' failed: {reason}")]
    StageFailure { stage: String, reason: String },

    #[error("Request timed out after {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The status a client receives when this error terminates its connection.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MalformedRequest(_) | GatewayError::DuplicateDispatch(_) => {
                StatusCode::BadRequest
            }
            GatewayError::StageFailure { .. } => StatusCode::BadRequest,
            GatewayError::MethodNotImplemented(_) => StatusCode::NotImplemented,
            GatewayError::VersionNotSupported(_) => StatusCode::VersionNotSupported,
            GatewayError::RequestTimeout(_) => StatusCode::GatewayTimeout,
            GatewayError::Io(_)
            | GatewayError::QueueFull { .. }
            | GatewayError::QueueClosed(_)
            | GatewayError::OrphanCompletion(_)
            | GatewayError::ChannelClosed(_)
            | GatewayError::Internal(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Io(Arc::new(e))
    }
}

impl From<std::num::ParseIntError> for GatewayError {
    fn from(e: std::num::ParseIntError) -> Self {
        GatewayError::MalformedRequest(e.to_string())
    }
}

impl From<std::str::Utf8Error> for GatewayError {
    fn from(e: std::str::Utf8Error) -> Self {
        GatewayError::MalformedRequest(e.to_string())
    }
}
