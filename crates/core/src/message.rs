// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session message payloads.
//!
//! These are the bodies carried inside existing-session wire messages and
//! buffered in session state while a session is still initiating. The wire
//! envelopes themselves live in `skein-wire`.

use crate::error::FlowException;
use crate::id::{ErrorId, SessionId};
use serde::{Deserialize, Serialize};

/// An error travelling across a session.
///
/// Carries the exception body only on the first hop; every further hop
/// transmits just the `error_id` and the peer surfaces a generic error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSessionMessage {
    pub error_id: ErrorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<FlowException>,
}

/// Payload of a message on an established (or establishing) session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionPayload {
    /// Ordered application data.
    #[serde(rename = "payload:data")]
    Data { seq: u64, body: serde_json::Value },

    /// Confirms a session initiation; carries the peer's session token.
    #[serde(rename = "payload:confirm")]
    Confirm { initiated_session_id: SessionId },

    /// Orderly end of the session in the sender's direction.
    #[serde(rename = "payload:end")]
    End,

    /// The sending flow errored.
    #[serde(rename = "payload:error")]
    Error(ErrorSessionMessage),
}

impl SessionPayload {
    /// Payload name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            SessionPayload::Data { .. } => "data",
            SessionPayload::Confirm { .. } => "confirm",
            SessionPayload::End => "end",
            SessionPayload::Error(_) => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SessionPayload::Error(_))
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
