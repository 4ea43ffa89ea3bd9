// src/core/mod.rs

//! The central module containing the core logic and data structures of the gateway
//! and its backend pipeline.

pub mod assembler;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod identity;
pub mod metrics;
pub mod pipeline;
pub mod protocol;
pub mod pubsub;
pub mod queue;
pub mod router;
pub mod state;

pub use errors::GatewayError;
pub use events::{CompletionEvent, Topic, WorkUnit};
pub use identity::ConnectionIdentity;
