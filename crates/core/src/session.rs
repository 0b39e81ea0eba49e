// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session state recorded in a flow's checkpoint.
//!
//! A session advances `Uninitiated → Initiating → Initiated`. The table is
//! keyed by our local session token; the peer's token arrives with the
//! confirmation message.

use crate::dedup::DedupId;
use crate::error::FlowError;
use crate::id::{PartyId, SessionId};
use crate::message::SessionPayload;
use serde::{Deserialize, Serialize};

/// State of one session as seen from this side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum SessionState {
    /// Registered by the flow but nothing sent yet.
    #[serde(rename = "uninitiated")]
    Uninitiated {
        destination: PartyId,
        flow_name: String,
    },

    /// Initial message sent (or about to be); awaiting confirmation.
    /// Outbound messages queue up in `buffered_messages` until then.
    #[serde(rename = "initiating")]
    Initiating {
        our_session_id: SessionId,
        destination: PartyId,
        flow_name: String,
        sent: bool,
        buffered_messages: Vec<(DedupId, SessionPayload)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rejection_error: Option<Box<FlowError>>,
        next_send_seq: u64,
    },

    /// Confirmed on both sides; tokens are swapped with the peer.
    #[serde(rename = "initiated")]
    Initiated {
        our_session_id: SessionId,
        peer_session_id: SessionId,
        peer_party: PartyId,
        next_send_seq: u64,
        /// Inbound data, in delivery order, not yet consumed by the flow.
        received_messages: Vec<(u64, serde_json::Value)>,
        /// Inbound peer errors not yet surfaced to the flow.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        errors: Vec<FlowError>,
        other_side_errored: bool,
        other_side_closed: bool,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitiated { .. } => "uninitiated",
            SessionState::Initiating { .. } => "initiating",
            SessionState::Initiated { .. } => "initiated",
        }
    }

    /// Whether this session still buffers unsent error messages.
    ///
    /// Such sessions hold an errored flow open: the errors must flush when
    /// the confirmation finally arrives.
    pub fn holds_buffered_errors(&self) -> bool {
        match self {
            SessionState::Initiating {
                buffered_messages,
                rejection_error,
                ..
            } => rejection_error.is_none() && buffered_messages.iter().any(|(_, p)| p.is_error()),
            _ => false,
        }
    }

    /// The peer half of an initiated session, if established.
    pub fn peer(&self) -> Option<(SessionId, &PartyId)> {
        match self {
            SessionState::Initiated {
                peer_session_id,
                peer_party,
                ..
            } => Some((*peer_session_id, peer_party)),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
