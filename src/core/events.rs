// src/core/events.rs

//! The messages that travel through the backend pipeline: work units flowing
//! into stages and completion events flowing back out to the gateway.

use crate::core::identity::ConnectionIdentity;
use bytes::Bytes;
use strum_macros::{Display, EnumIter};

/// A routing tag carried by a work unit and copied into its completion event.
/// Subscribers select events by route prefix; the empty route is the broadcast route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Route(Bytes);

impl Route {
    pub fn new(tag: impl Into<Bytes>) -> Self {
        Self(tag.into())
    }

    /// The empty route, matched by every subscriber.
    pub fn broadcast() -> Self {
        Self(Bytes::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

/// A unit of work handed from the gateway to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub identity: ConnectionIdentity,
    pub route: Route,
    pub payload: Bytes,
}

impl WorkUnit {
    pub fn new(identity: ConnectionIdentity, payload: impl Into<Bytes>) -> Self {
        Self {
            identity,
            route: Route::broadcast(),
            payload: payload.into(),
        }
    }

    /// Derives the unit handed to the next stage. Identity and route are preserved.
    pub fn forward(&self, payload: impl Into<Bytes>) -> Self {
        Self {
            identity: self.identity.clone(),
            route: self.route.clone(),
            payload: payload.into(),
        }
    }
}

/// The topic a completion event is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Topic {
    Success,
    Error,
}

impl Topic {
    /// The one-byte wire tag for this topic.
    pub fn tag(self) -> u8 {
        match self {
            Topic::Success => b'S',
            Topic::Error => b'E',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'S' => Some(Topic::Success),
            b'E' => Some(Topic::Error),
            _ => None,
        }
    }
}

/// The terminal result of a work unit. Immutable once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub topic: Topic,
    pub identity: ConnectionIdentity,
    pub route: Route,
    pub payload: Bytes,
}

impl CompletionEvent {
    pub fn success(unit: &WorkUnit, payload: impl Into<Bytes>) -> Self {
        Self::for_unit(Topic::Success, unit, payload.into())
    }

    pub fn error(unit: &WorkUnit, diagnostic: impl Into<Bytes>) -> Self {
        Self::for_unit(Topic::Error, unit, diagnostic.into())
    }

    fn for_unit(topic: Topic, unit: &WorkUnit, payload: Bytes) -> Self {
        Self {
            topic,
            identity: unit.identity.clone(),
            route: unit.route.clone(),
            payload,
        }
    }
}
