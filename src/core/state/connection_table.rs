// src/core/state/connection_table.rs

//! The table of connections the gateway is currently serving.
//!
//! Entries are keyed by token but every lookup also checks the generation, so
//! an identity from a previous connection on the same token never matches.

use crate::connection::ConnectionWriter;
use crate::core::identity::ConnectionIdentity;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use strum_macros::Display;

/// Where a connection is in its single request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    OpenAwaitingRequest,
    RequestDispatched,
    ResponseSent,
    Closed,
}

#[derive(Debug)]
pub struct ConnectionEntry {
    pub identity: ConnectionIdentity,
    state: ConnectionState,
    pub writer: ConnectionWriter,
    pub opened_at: Instant,
    pub dispatched_at: Option<Instant>,
    /// Set once a second request on this connection has been answered with an error.
    pub extra_request_rejected: bool,
}

impl ConnectionEntry {
    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: HashMap<Bytes, ConnectionEntry>,
    dispatched: usize,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly opened connection. If an entry from an older generation
    /// still holds the token it is evicted and returned.
    pub fn open(
        &mut self,
        identity: ConnectionIdentity,
        writer: ConnectionWriter,
        now: Instant,
    ) -> Option<ConnectionEntry> {
        let entry = ConnectionEntry {
            identity: identity.clone(),
            state: ConnectionState::OpenAwaitingRequest,
            writer,
            opened_at: now,
            dispatched_at: None,
            extra_request_rejected: false,
        };
        let evicted = self.entries.insert(identity.token().clone(), entry);
        if let Some(old) = &evicted
            && old.state == ConnectionState::RequestDispatched
        {
            self.dispatched -= 1;
        }
        evicted
    }

    pub fn get(&self, identity: &ConnectionIdentity) -> Option<&ConnectionEntry> {
        self.entries
            .get(identity.token())
            .filter(|e| e.identity.generation() == identity.generation())
    }

    pub fn get_mut(&mut self, identity: &ConnectionIdentity) -> Option<&mut ConnectionEntry> {
        self.entries
            .get_mut(identity.token())
            .filter(|e| e.identity.generation() == identity.generation())
    }

    pub fn state_of(&self, identity: &ConnectionIdentity) -> Option<ConnectionState> {
        self.get(identity).map(|e| e.state)
    }

    /// Moves a connection to `to`, returning its previous state.
    pub fn transition(
        &mut self,
        identity: &ConnectionIdentity,
        to: ConnectionState,
        now: Instant,
    ) -> Option<ConnectionState> {
        let entry = self
            .entries
            .get_mut(identity.token())
            .filter(|e| e.identity.generation() == identity.generation())?;
        let from = entry.state;
        entry.state = to;
        if to == ConnectionState::RequestDispatched {
            entry.dispatched_at = Some(now);
        }
        match (
            from == ConnectionState::RequestDispatched,
            to == ConnectionState::RequestDispatched,
        ) {
            (false, true) => self.dispatched += 1,
            (true, false) => self.dispatched -= 1,
            _ => {}
        }
        Some(from)
    }

    /// Removes a connection. The returned entry is marked `Closed`.
    pub fn remove(&mut self, identity: &ConnectionIdentity) -> Option<ConnectionEntry> {
        let owned = self.get(identity).is_some();
        if !owned {
            return None;
        }
        let mut entry = self.entries.remove(identity.token())?;
        if entry.state == ConnectionState::RequestDispatched {
            self.dispatched -= 1;
        }
        entry.state = ConnectionState::Closed;
        Some(entry)
    }

    /// Removes and returns every entry.
    pub fn drain(&mut self) -> Vec<ConnectionEntry> {
        self.dispatched = 0;
        self.entries
            .drain()
            .map(|(_, mut entry)| {
                entry.state = ConnectionState::Closed;
                entry
            })
            .collect()
    }

    /// Connections whose request has waited on the pipeline longer than `timeout`.
    pub fn expired_dispatched(&self, now: Instant, timeout: Duration) -> Vec<ConnectionIdentity> {
        self.entries
            .values()
            .filter(|e| e.state == ConnectionState::RequestDispatched)
            .filter(|e| {
                e.dispatched_at
                    .is_some_and(|at| now.saturating_duration_since(at) > timeout)
            })
            .map(|e| e.identity.clone())
            .collect()
    }

    /// Connections still waiting for a request that were opened longer than
    /// `timeout` ago.
    pub fn idle_awaiting(&self, now: Instant, timeout: Duration) -> Vec<ConnectionIdentity> {
        self.entries
            .values()
            .filter(|e| e.state == ConnectionState::OpenAwaitingRequest)
            .filter(|e| now.saturating_duration_since(e.opened_at) > timeout)
            .map(|e| e.identity.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of connections in `RequestDispatched`.
    pub fn dispatched_count(&self) -> usize {
        self.dispatched
    }
}
