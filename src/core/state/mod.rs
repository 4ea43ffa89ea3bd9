// src/core/state/mod.rs

//! State owned by the gateway: the table of open connections and the shared
//! statistics counters.

mod connection_table;
mod stats;

pub use connection_table::{ConnectionEntry, ConnectionState, ConnectionTable};
pub use stats::GatewayStats;
