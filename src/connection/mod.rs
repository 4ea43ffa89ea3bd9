// src/connection/mod.rs

//! Manages the socket side of a single client TCP connection: reading chunks
//! into the gateway's intake and writing the responses the gateway queues.

// Declare the private sub-modules of the `connection` module.
mod guard;
mod handler;
mod writer;

// Publicly re-export the primary types from the sub-modules.
pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use writer::{ConnectionWriter, Outbound};
