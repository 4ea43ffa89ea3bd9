// src/core/identity.rs

//! Connection identities: the opaque token that correlates every transport
//! frame, work unit and completion event belonging to one client connection.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The length in bytes of a connection token.
pub const TOKEN_LEN: usize = 5;

/// Identifies one client connection for one request/response cycle.
///
/// The `token` is what the transport hands out; the `generation` distinguishes
/// two connections that happen to share a token, so an event produced for an
/// earlier connection can never be delivered to a later one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    token: Bytes,
    generation: u64,
}

impl ConnectionIdentity {
    pub fn new(token: impl Into<Bytes>, generation: u64) -> Self {
        Self {
            token: token.into(),
            generation,
        }
    }

    pub fn token(&self) -> &Bytes {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.token.iter() {
            write!(f, "{b:02x}")?;
        }
        write!(f, "#{}", self.generation)
    }
}

/// Mints identities for newly accepted connections.
///
/// Tokens are a zero byte followed by a big-endian 32-bit counter, which wraps.
/// Generations never repeat for the lifetime of the minter.
#[derive(Debug, Default)]
pub struct IdentityMinter {
    next_token: u32,
    next_generation: u64,
}

impl IdentityMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the token counter at `start`. Used to exercise token reuse.
    pub fn starting_at(start: u32) -> Self {
        Self {
            next_token: start,
            next_generation: 0,
        }
    }

    pub fn mint(&mut self) -> ConnectionIdentity {
        let mut token = BytesMut::with_capacity(TOKEN_LEN);
        token.put_u8(0);
        token.put_u32(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        self.next_generation += 1;
        ConnectionIdentity::new(token.freeze(), self.next_generation)
    }
}
