// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Types shared between the pure transition function and the fiber driver:
//! machine state, continuations, resume values, and the requests a flow
//! hands back at each suspension point.

use crate::action::Action;
use crate::checkpoint::{Checkpoint, SuspendReason};
use crate::dedup::DedupHandler;
use crate::error::{FlowError, FlowException};
use crate::id::{PartyId, SessionId};
use serde::{Deserialize, Serialize};

/// Frozen continuation frame: the flow's own serialisable rendition of its
/// call stack at a suspension point. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowFrame(pub serde_json::Value);

impl FlowFrame {
    pub fn from_value(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// The full in-memory state the transition function operates on: the
/// durable checkpoint plus transient bookkeeping that must not be
/// persisted (ack tokens die with the process; redelivery covers them).
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    pub checkpoint: Checkpoint,
    /// Inbound handlers processed but not yet acknowledged; drained into an
    /// `AcknowledgeMessages` action after the next commit.
    pub unacked_handlers: Vec<DedupHandler>,
    /// Set once `RemoveFlow` has been emitted. A removed flow may linger to
    /// flush errors buffered on still-initiating sessions.
    pub removed: bool,
}

impl MachineState {
    pub fn new(checkpoint: Checkpoint) -> Self {
        Self {
            checkpoint,
            unacked_handlers: Vec::new(),
            removed: false,
        }
    }
}

/// Value handed to the fiber when it resumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resume")]
pub enum ResumeValue {
    /// First resumption: the flow's start arguments.
    #[serde(rename = "args")]
    Args { args: serde_json::Value },

    /// Plain wakeup (sleep elapsed, yield committed, session registered).
    #[serde(rename = "unit")]
    Unit,

    /// One data message popped from each awaited session, in request order.
    #[serde(rename = "session-data")]
    SessionData {
        messages: Vec<(SessionId, serde_json::Value)>,
    },

    /// Result of a completed async operation.
    #[serde(rename = "operation")]
    Operation { result: serde_json::Value },

    /// The awaited work failed; the fiber observes this as a thrown error.
    #[serde(rename = "error")]
    Error { error: FlowError },
}

/// What the transition tells the fiber driver to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "continuation")]
pub enum Continuation {
    /// Run the fiber with the given value.
    #[serde(rename = "resume")]
    Resume { value: ResumeValue },

    /// Park and wait for the next external event.
    #[serde(rename = "process-events")]
    ProcessEvents,

    /// Stop driving this fiber (terminal, retried, or shut down).
    #[serde(rename = "abort")]
    Abort,
}

/// Result of one transition: the successor state, the side effects to run,
/// and what the driver does afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionResult {
    pub state: MachineState,
    pub actions: Vec<Action>,
    pub continuation: Continuation,
}

/// Session work a flow hands over when it suspends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request")]
pub enum FlowRequest {
    /// Register a new session with a peer. The fiber allocates the local
    /// session token.
    #[serde(rename = "initiate")]
    Initiate {
        session_id: SessionId,
        destination: PartyId,
        flow_name: String,
    },

    /// Queue a data message on a session. Opens the session on first use.
    #[serde(rename = "send")]
    Send {
        session_id: SessionId,
        body: serde_json::Value,
    },

    /// Close a session in our direction.
    #[serde(rename = "close")]
    Close { session_id: SessionId },
}

/// What a fiber step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowYield {
    /// Suspend: hand over session requests, the reason, and the frozen
    /// frame to checkpoint.
    Suspend {
        requests: Vec<FlowRequest>,
        reason: SuspendReason,
        frame: FlowFrame,
    },

    /// The flow ran to completion.
    Finish { result: serde_json::Value },

    /// User code raised an exception the flow did not catch.
    Throw { exception: FlowException },
}

/// Completion of an async operation, as delivered back to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum OpOutcome {
    #[serde(rename = "completed")]
    Completed { result: serde_json::Value },

    #[serde(rename = "failed")]
    Failed { exception: FlowException },
}
