// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire message envelopes exchanged between peered engines.

use serde::{Deserialize, Serialize};
use skein_core::{DedupId, PartyId, SessionId, SessionPayload};

/// First message of a session: asks the receiving node to create a
/// counterparty flow and confirm with its own session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialSessionMessage {
    pub initiator_session_id: SessionId,
    /// Registered name of the flow to start on the receiving side.
    pub flow_name: String,
    pub app_name: String,
    pub platform_version: u32,
    /// Optional first data message, delivered once the session confirms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Any message on an already-established session, addressed by the
/// recipient's own session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingSessionMessage {
    pub recipient_session_id: SessionId,
    pub payload: SessionPayload,
}

/// The two shapes a session message can take on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message")]
pub enum SessionMessage {
    #[serde(rename = "initial")]
    Initial(InitialSessionMessage),

    #[serde(rename = "existing")]
    Existing(ExistingSessionMessage),
}

impl SessionMessage {
    pub fn name(&self) -> &'static str {
        match self {
            SessionMessage::Initial(_) => "initial",
            SessionMessage::Existing(_) => "existing",
        }
    }
}

/// A routed message: who sent it, who receives it, and the dedup id the
/// receiving bus uses to suppress replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: PartyId,
    pub destination: PartyId,
    pub dedup_id: DedupId,
    #[serde(flatten)]
    pub message: SessionMessage,
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
