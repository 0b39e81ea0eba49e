// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes for flows, sessions, errors, clients and peers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a flow.
///
/// Assigned once at flow creation and immutable thereafter. The checkpoint
/// store holds at most one checkpoint per `FlowId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub Uuid);

impl FlowId {
    /// Generate a fresh random flow identifier.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        let s = self.0.simple().to_string();
        s[..8].to_string()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for FlowId {
    fn from(u: Uuid) -> Self {
        Self(u)
    }
}

/// Session identifier: an opaque 64-bit token, unique per flow per peer
/// instance. The initiating side allocates its token at random; the peer's
/// token arrives with the session confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Allocate a fresh random session token.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().as_u64_pair().0)
    }

    /// Deterministically derive a session token from a flow and a per-flow
    /// ordinal. A replayed fiber must reproduce the tokens it allocated
    /// before the crash, so flows derive rather than draw them.
    pub fn derived(flow: &FlowId, ordinal: u64) -> Self {
        let (hi, lo) = flow.as_uuid().as_u64_pair();
        let mut x = lo ^ hi.wrapping_add(0x9E37_79B9_7F4A_7C15u64.wrapping_mul(ordinal.wrapping_add(1)));
        x ^= x >> 30;
        x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
        x ^= x >> 31;
        Self(x)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Globally unique error identifier, used by peers to correlate propagated
/// errors across hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorId(pub u64);

impl ErrorId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().as_u64_pair().0)
    }

    /// Deterministically derive an error id from a flow and a per-flow
    /// sequence number (splitmix64 finalizer over the flow's random bits).
    /// Used where an id must be allocated inside the pure transition
    /// function, which cannot draw randomness.
    pub fn derived(flow: &FlowId, seq: u64) -> Self {
        let (hi, lo) = flow.as_uuid().as_u64_pair();
        let mut x = hi ^ lo.wrapping_add(0x9E37_79B9_7F4A_7C15u64.wrapping_mul(seq.wrapping_add(1)));
        x ^= x >> 30;
        x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
        x ^= x >> 31;
        Self(x)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Client handle supplied at flow start for external-result retrieval.
///
/// When set, the flow's checkpoint row and recorded outcome survive flow
/// removal so the client can fetch the result later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Name of a peer node on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub String);

impl PartyId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
