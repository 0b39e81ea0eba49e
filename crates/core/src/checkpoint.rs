// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable checkpoint: everything needed to resume a flow after a
//! crash, restart, or migration.

use crate::dedup::DedupId;
use crate::error::FlowError;
use crate::id::{ClientId, FlowId, PartyId, SessionId};
use crate::session::SessionState;
use crate::transition::FlowFrame;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Operator-visible status of a flow's checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Runnable,
    Hospitalized,
    Paused,
    Completed,
    Failed,
    Killed,
}

impl CheckpointStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckpointStatus::Completed | CheckpointStatus::Failed | CheckpointStatus::Killed
        )
    }
}

/// Why a started flow is suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason")]
pub enum SuspendReason {
    /// Awaiting one data message from each listed session.
    #[serde(rename = "receive")]
    Receive { sessions: Vec<SessionId> },

    /// Sleeping until the given wall-clock instant.
    #[serde(rename = "sleep")]
    SleepUntil { until_epoch_ms: u64 },

    /// Awaiting the completion of a submitted async operation. The
    /// operation rides in the checkpoint so a recovering engine can
    /// re-submit the work; the sequence number is allocated by the
    /// transition (any value supplied by the fiber is replaced).
    #[serde(rename = "await-operation")]
    AwaitOperation {
        op_seq: u64,
        operation: crate::action::OperationSpec,
    },

    /// Explicit suspend: commit the checkpoint, then resume immediately.
    #[serde(rename = "yield")]
    Yield,
}

/// Where a flow came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin")]
pub enum FlowOrigin {
    /// Started by a local client.
    #[serde(rename = "client")]
    Client {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },

    /// Created by a peer's session-initiating message.
    #[serde(rename = "peer")]
    Peer {
        party: PartyId,
        initiator_session_id: SessionId,
    },
}

/// Who started the flow, when, and with what arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationContext {
    pub origin: FlowOrigin,
    pub flow_name: String,
    pub args: serde_json::Value,
    pub started_at: DateTime<Utc>,
}

impl InvocationContext {
    pub fn client_id(&self) -> Option<&ClientId> {
        match &self.origin {
            FlowOrigin::Client { client_id } => client_id.as_ref(),
            FlowOrigin::Peer { .. } => None,
        }
    }
}

/// Execution phase of the flow's user code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase")]
pub enum FlowState {
    /// Persisted before the first user instruction runs.
    #[serde(rename = "unstarted")]
    Unstarted { args: serde_json::Value },

    /// Suspended at a well-defined point with a frozen continuation frame.
    #[serde(rename = "started")]
    Started {
        reason: SuspendReason,
        frame: FlowFrame,
    },

    /// User code ran to completion (orderly or errored).
    #[serde(rename = "finished")]
    Finished,
}

/// Session table and commit counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Keyed by our local session token. Iteration order is insertion
    /// order, which keeps action emission deterministic.
    pub sessions: IndexMap<SessionId, SessionState>,
    /// Strictly monotone commit counter; the optimistic-replace version for
    /// the checkpoint store.
    pub num_commits: u64,
    /// Per-flow counter feeding send deduplication ids.
    pub next_dedup_seq: u64,
    /// Per-flow counter correlating async operations.
    pub next_op_seq: u64,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self {
            sessions: IndexMap::new(),
            num_commits: 0,
            next_dedup_seq: 1,
            next_op_seq: 1,
        }
    }
}

/// Error bookkeeping for a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum ErrorState {
    #[serde(rename = "clean")]
    Clean,

    #[serde(rename = "errored")]
    Errored {
        errors: Vec<FlowError>,
        /// Errors below this index have been transmitted to peers. Never
        /// decreases; never exceeds `errors.len()`.
        propagated_index: u32,
        propagating: bool,
    },
}

impl ErrorState {
    pub fn is_errored(&self) -> bool {
        matches!(self, ErrorState::Errored { .. })
    }

    pub fn errors(&self) -> &[FlowError] {
        match self {
            ErrorState::Clean => &[],
            ErrorState::Errored { errors, .. } => errors,
        }
    }
}

/// How a flow ended, as visible to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum FlowOutcome {
    #[serde(rename = "orderly")]
    OrderlyFinish { result: serde_json::Value },

    #[serde(rename = "errored")]
    ErrorFinish { errors: Vec<FlowError> },
}

/// Durable snapshot of one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: FlowId,
    pub invocation_context: InvocationContext,
    pub flow_state: FlowState,
    pub checkpoint_state: CheckpointState,
    pub error_state: ErrorState,
    pub status: CheckpointStatus,
    /// Dedup ids of inbound messages processed since the last commit. They
    /// ride with the checkpoint in the same transaction, so a message is
    /// never acknowledged without its fact being durable.
    pub pending_deduplication_facts: Vec<DedupId>,
}

impl Checkpoint {
    /// Fresh unstarted checkpoint for a new flow.
    pub fn unstarted(id: FlowId, invocation_context: InvocationContext) -> Self {
        let args = invocation_context.args.clone();
        Self {
            id,
            invocation_context,
            flow_state: FlowState::Unstarted { args },
            checkpoint_state: CheckpointState::default(),
            error_state: ErrorState::Clean,
            status: CheckpointStatus::Runnable,
            pending_deduplication_facts: Vec::new(),
        }
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.invocation_context.client_id()
    }

    pub fn is_errored(&self) -> bool {
        self.error_state.is_errored()
    }

    /// Append a flow error, entering the errored state if still clean.
    pub fn push_error(&mut self, error: FlowError) {
        match &mut self.error_state {
            ErrorState::Clean => {
                self.error_state = ErrorState::Errored {
                    errors: vec![error],
                    propagated_index: 0,
                    propagating: false,
                };
            }
            ErrorState::Errored { errors, .. } => errors.push(error),
        }
    }

    /// Allocate the next send-dedup sequence number.
    pub fn next_dedup_seq(&mut self) -> u64 {
        let seq = self.checkpoint_state.next_dedup_seq;
        self.checkpoint_state.next_dedup_seq += 1;
        seq
    }

    /// Allocate the next async-operation sequence number.
    pub fn next_op_seq(&mut self) -> u64 {
        let seq = self.checkpoint_state.next_op_seq;
        self.checkpoint_state.next_op_seq += 1;
        seq
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
