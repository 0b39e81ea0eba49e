// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events that drive flow state transitions.
//!
//! The vocabulary is closed: the transition function matches exhaustively
//! on event × flow phase, so adding a variant forces every phase to decide
//! how to handle it.

use crate::checkpoint::SuspendReason;
use crate::dedup::DedupHandler;
use crate::error::FlowError;
use crate::id::{PartyId, SessionId};
use crate::message::SessionPayload;
use crate::transition::{FlowFrame, FlowRequest, OpOutcome};
use serde::{Deserialize, Serialize};

/// One input to the flow state machine.
///
/// Serializes with `{"type": "scope:name", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- lifecycle --
    /// Begin executing an unstarted flow.
    #[serde(rename = "flow:start")]
    Start,

    /// The fiber reached a suspension point.
    #[serde(rename = "flow:suspend")]
    Suspend {
        requests: Vec<FlowRequest>,
        reason: SuspendReason,
        frame: FlowFrame,
    },

    /// The fiber registered a new session before its next suspension.
    #[serde(rename = "session:initiate")]
    InitiateSession {
        session_id: SessionId,
        destination: PartyId,
        flow_name: String,
    },

    /// User code ran to completion.
    #[serde(rename = "flow:finished")]
    Finished { result: serde_json::Value },

    /// An error reached the state machine (user-raised or internal).
    #[serde(rename = "flow:error")]
    Error { error: FlowError },

    // -- inbound --
    /// A session message arrived from the bus.
    #[serde(rename = "session:message")]
    MessageReceived {
        session_id: SessionId,
        payload: SessionPayload,
        handler: DedupHandler,
    },

    /// Surface end-of-session to a flow awaiting a closed session.
    #[serde(rename = "session:ended")]
    DeliverSessionEnded { session_id: SessionId },

    /// An async operation submitted by this flow completed.
    #[serde(rename = "op:completed")]
    AsyncOpCompleted { op_seq: u64, outcome: OpOutcome },

    // -- timers --
    /// A sleep requested by the flow elapsed.
    #[serde(rename = "timer:sleep-finished")]
    SleepFinished,

    /// The flow-level timeout fired.
    #[serde(rename = "timer:flow-timeout")]
    FlowTimeout,

    // -- supervision --
    /// Discard in-flight work and restart from the last committed
    /// checkpoint.
    #[serde(rename = "flow:retry")]
    RetryFromSafePoint,

    /// Graceful drain: park the fiber at its committed suspension point.
    #[serde(rename = "flow:shutdown")]
    SoftShutdown,

    /// Begin transmitting recorded errors to live peer sessions.
    #[serde(rename = "flow:propagate")]
    StartErrorPropagation,

    /// Park the flow for operator attention.
    #[serde(rename = "flow:pause")]
    Pause,

    /// Remove the flow immediately, firing compensating actions.
    #[serde(rename = "flow:kill")]
    Kill,
}

impl Event {
    /// Event name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Suspend { .. } => "suspend",
            Event::InitiateSession { .. } => "initiate_session",
            Event::Finished { .. } => "finished",
            Event::Error { .. } => "error",
            Event::MessageReceived { .. } => "message_received",
            Event::DeliverSessionEnded { .. } => "session_ended",
            Event::AsyncOpCompleted { .. } => "op_completed",
            Event::SleepFinished => "sleep_finished",
            Event::FlowTimeout => "flow_timeout",
            Event::RetryFromSafePoint => "retry",
            Event::SoftShutdown => "soft_shutdown",
            Event::StartErrorPropagation => "start_propagation",
            Event::Pause => "pause",
            Event::Kill => "kill",
        }
    }

    /// One-line summary for log output.
    pub fn log_summary(&self) -> String {
        match self {
            Event::Suspend {
                requests, reason, ..
            } => format!("suspend requests={} reason={:?}", requests.len(), reason),
            Event::InitiateSession {
                session_id,
                destination,
                flow_name,
            } => format!("initiate {session_id} -> {destination} ({flow_name})"),
            Event::MessageReceived {
                session_id,
                payload,
                ..
            } => format!("message {} on {session_id}", payload.name()),
            Event::DeliverSessionEnded { session_id } => format!("session {session_id} ended"),
            Event::AsyncOpCompleted { op_seq, .. } => format!("op {op_seq} completed"),
            Event::Error { error } => format!("error {}", error.error_id),
            other => other.name().to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
