// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deduplication identifiers and inbound acknowledgement handlers.
//!
//! Every message crossing the bus carries a [`DedupId`]. On the send side it
//! lets the receiving bus suppress replays after a crash-and-resend; on the
//! receive side it is the durable fact proving a message was processed.

use crate::id::{ErrorId, FlowId, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deduplication identifier, collision-free by construction.
///
/// Normal messages are identified by the sending flow and a per-flow
/// monotonic sequence; error messages by the (globally unique) error id and
/// the session they were emitted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DedupId {
    #[serde(rename = "message")]
    Message { sender: FlowId, seq: u64 },

    #[serde(rename = "error")]
    Error {
        error_id: ErrorId,
        source_session: SessionId,
    },
}

impl fmt::Display for DedupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupId::Message { sender, seq } => write!(f, "msg:{}:{}", sender.short(), seq),
            DedupId::Error {
                error_id,
                source_session,
            } => write!(f, "err:{}:{}", error_id, source_session),
        }
    }
}

/// Opaque token for an inbound delivery.
///
/// The bus hands one of these with every delivered message; acknowledging it
/// tells the bus the message has been durably processed. Acknowledgement
/// happens only after the checkpoint commit that persisted the matching
/// dedup fact — loss between commit and ack is tolerable because the durable
/// fact suppresses the redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupHandler {
    pub dedup_id: DedupId,
    /// Bus-issued ack token. Not durable; a redelivery carries a new one.
    pub ack_token: u64,
}

impl DedupHandler {
    pub fn new(dedup_id: DedupId, ack_token: u64) -> Self {
        Self {
            dedup_id,
            ack_token,
        }
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
