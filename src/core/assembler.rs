// src/core/assembler.rs

//! Reassembles HTTP request heads from the arbitrary chunks a transport delivers.
//!
//! Each connection gets its own buffer, keyed by token. A buffer lives until the
//! request completes, is rejected, stalls, or the connection goes away, and is
//! released exactly once in each of those cases.

use crate::core::identity::ConnectionIdentity;
use crate::core::protocol::http_request::HEAD_TERMINATOR;
use crate::core::protocol::http_response::find_subsequence;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// A complete request head, exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest(Bytes);

impl RawRequest {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Why a connection's input was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("empty data frame")]
    EmptyFrame,
    #[error("request exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("unexpected bytes after the end of the request head")]
    TrailingBytes,
    #[error("request was not completed within {0:?}")]
    Stalled(Duration),
}

impl MalformedReason {
    /// A short, stable label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            MalformedReason::EmptyFrame => "empty_frame",
            MalformedReason::TooLarge { .. } => "too_large",
            MalformedReason::TrailingBytes => "trailing_bytes",
            MalformedReason::Stalled(_) => "stalled",
        }
    }
}

/// The result of feeding a chunk to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Incomplete,
    Complete(RawRequest),
    Malformed(MalformedReason),
}

#[derive(Debug)]
struct PartialRequest {
    identity: ConnectionIdentity,
    buffer: BytesMut,
    started: Instant,
    /// How far the buffer has already been searched for the terminator.
    scanned: usize,
}

/// Per-connection request reassembly with size and time ceilings.
#[derive(Debug)]
pub struct FrameAssembler {
    buffers: HashMap<Bytes, PartialRequest>,
    max_request_size: usize,
    assembly_timeout: Duration,
}

impl FrameAssembler {
    pub fn new(max_request_size: usize, assembly_timeout: Duration) -> Self {
        Self {
            buffers: HashMap::new(),
            max_request_size,
            assembly_timeout,
        }
    }

    pub fn feed(&mut self, identity: &ConnectionIdentity, chunk: &[u8]) -> RequestState {
        self.feed_at(identity, chunk, Instant::now())
    }

    /// Appends `chunk` to the connection's buffer, using `now` as the arrival time.
    pub fn feed_at(
        &mut self,
        identity: &ConnectionIdentity,
        chunk: &[u8],
        now: Instant,
    ) -> RequestState {
        if chunk.is_empty() {
            self.release(identity);
            return RequestState::Malformed(MalformedReason::EmptyFrame);
        }

        let token = identity.token().clone();
        let stale = self
            .buffers
            .get(&token)
            .is_some_and(|p| p.identity.generation() != identity.generation());
        if stale {
            debug!("Discarding buffer of a previous connection on token {identity}");
            self.buffers.remove(&token);
        }

        let partial = self
            .buffers
            .entry(token.clone())
            .or_insert_with(|| PartialRequest {
                identity: identity.clone(),
                buffer: BytesMut::new(),
                started: now,
                scanned: 0,
            });

        if partial.buffer.len() + chunk.len() > self.max_request_size {
            self.buffers.remove(&token);
            return RequestState::Malformed(MalformedReason::TooLarge {
                limit: self.max_request_size,
            });
        }
        partial.buffer.extend_from_slice(chunk);

        // Back up so a terminator split across chunks is still found.
        let from = partial
            .scanned
            .saturating_sub(HEAD_TERMINATOR.len() - 1);
        match find_subsequence(&partial.buffer[from..], HEAD_TERMINATOR) {
            Some(offset) => {
                let end = from + offset + HEAD_TERMINATOR.len();
                let complete = end == partial.buffer.len();
                let Some(partial) = self.buffers.remove(&token) else {
                    return RequestState::Incomplete;
                };
                if complete {
                    RequestState::Complete(RawRequest(partial.buffer.freeze()))
                } else {
                    RequestState::Malformed(MalformedReason::TrailingBytes)
                }
            }
            None => {
                partial.scanned = partial.buffer.len();
                RequestState::Incomplete
            }
        }
    }

    /// Drops the buffer held for `identity`, if any. Returns whether one existed.
    pub fn release(&mut self, identity: &ConnectionIdentity) -> bool {
        let owned = self
            .buffers
            .get(identity.token())
            .is_some_and(|p| p.identity.generation() == identity.generation());
        if owned {
            self.buffers.remove(identity.token());
        }
        owned
    }

    /// Removes every buffer whose first byte arrived more than `assembly_timeout`
    /// before `now`, returning the identities that stalled.
    pub fn sweep_stalled(&mut self, now: Instant) -> Vec<ConnectionIdentity> {
        let timeout = self.assembly_timeout;
        let mut stalled = Vec::new();
        self.buffers.retain(|_, partial| {
            if now.saturating_duration_since(partial.started) > timeout {
                stalled.push(partial.identity.clone());
                false
            } else {
                true
            }
        });
        stalled
    }

    /// The number of connections with a partially received request.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_buffering(&self, identity: &ConnectionIdentity) -> bool {
        self.buffers
            .get(identity.token())
            .is_some_and(|p| p.identity.generation() == identity.generation())
    }
}
