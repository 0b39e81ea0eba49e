// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actions: the closed vocabulary of side effects a transition can request.
//!
//! The action executor interprets these strictly in order. Within one list,
//! exactly one `CreateTransaction` precedes any persistence action and
//! exactly one `CommitTransaction` or `RollbackTransaction` ends the
//! transactional span.

use crate::checkpoint::{Checkpoint, FlowOutcome};
use crate::dedup::{DedupHandler, DedupId};
use crate::id::{ClientId, FlowId, PartyId, SessionId};
use crate::message::{ErrorSessionMessage, SessionPayload};
use serde::{Deserialize, Serialize};

/// One queued send on an established session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingSend {
    pub peer: PartyId,
    pub recipient_session_id: SessionId,
    pub payload: SessionPayload,
    pub dedup_id: DedupId,
}

/// Peer half of an initiated session, as targeted by error propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSession {
    pub session_id: SessionId,
    pub party: PartyId,
}

/// A named async operation with its parameters. The engine resolves the
/// name against the operation registry at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    pub params: serde_json::Value,
}

/// Side effects requested by the transition function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    // === Transaction bracketing ===
    #[serde(rename = "txn:create")]
    CreateTransaction,

    #[serde(rename = "txn:commit")]
    CommitTransaction,

    #[serde(rename = "txn:rollback")]
    RollbackTransaction,

    /// Register the open transaction in the live-transaction registry.
    #[serde(rename = "txn:track")]
    TrackTransaction { id: FlowId },

    // === Durable state ===
    /// Upsert the checkpoint keyed by (id, num_commits). Stale versions are
    /// rejected by the store.
    #[serde(rename = "checkpoint:persist")]
    PersistCheckpoint {
        id: FlowId,
        checkpoint: Box<Checkpoint>,
        is_update: bool,
    },

    /// Delete the checkpoint row. Result rows survive iff
    /// `may_have_persistent_results`.
    #[serde(rename = "checkpoint:remove")]
    RemoveCheckpoint {
        id: FlowId,
        may_have_persistent_results: bool,
    },

    /// Atomically insert inbound dedup facts. A conflict means the message
    /// was already delivered, which is not an error.
    #[serde(rename = "dedup:persist")]
    PersistDeduplicationFacts { facts: Vec<DedupId> },

    /// Record a client-visible outcome for later retrieval.
    #[serde(rename = "result:record")]
    RecordResult {
        client_id: ClientId,
        outcome: FlowOutcome,
    },

    // === Bus ===
    /// Acknowledge processed inbound messages. Runs only after commit;
    /// losses are tolerable because the durable facts suppress replays.
    #[serde(rename = "bus:ack")]
    AcknowledgeMessages { handlers: Vec<DedupHandler> },

    /// Send the session-initiating message.
    #[serde(rename = "bus:send-initial")]
    SendInitial {
        destination: PartyId,
        initiator_session_id: SessionId,
        flow_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
        dedup_id: DedupId,
    },

    /// Send one message on an established session.
    #[serde(rename = "bus:send-existing")]
    SendExisting {
        #[serde(flatten)]
        send: ExistingSend,
    },

    /// Send several messages, preserving order per destination.
    #[serde(rename = "bus:send-multiple")]
    SendMultiple { sends: Vec<ExistingSend> },

    /// Emit each error message to each listed peer session.
    #[serde(rename = "bus:propagate-errors")]
    PropagateErrors {
        messages: Vec<ErrorSessionMessage>,
        sessions: Vec<PeerSession>,
        sender: FlowId,
    },

    // === Timers ===
    /// Idempotent per-flow timeout scheduling.
    #[serde(rename = "timer:schedule")]
    ScheduleFlowTimeout { id: FlowId },

    #[serde(rename = "timer:cancel")]
    CancelFlowTimeout { id: FlowId },

    /// Wake the flow at the given wall-clock instant.
    #[serde(rename = "timer:sleep")]
    SleepUntil { id: FlowId, until_epoch_ms: u64 },

    // === Collaborators ===
    /// Hand an operation to the async-op runner; completion returns as an
    /// `AsyncOpCompleted` event.
    #[serde(rename = "op:execute")]
    ExecuteAsyncOperation {
        id: FlowId,
        op_seq: u64,
        operation: OperationSpec,
    },

    /// Release every soft lock held by the flow.
    #[serde(rename = "locks:release")]
    ReleaseSoftLocks { id: FlowId },

    // === Scheduler ===
    /// Restart the fiber from the last committed checkpoint.
    #[serde(rename = "flow:retry-from-safe-point")]
    RetryFlowFromSafePoint { id: FlowId },

    /// Drop inbound routing for the listed sessions.
    #[serde(rename = "session:remove-bindings")]
    RemoveSessionBindings { session_ids: Vec<SessionId> },

    /// Tear the flow out of the scheduler with its final outcome.
    #[serde(rename = "flow:remove")]
    RemoveFlow { id: FlowId, outcome: FlowOutcome },
}

impl Action {
    /// Action name for log spans (e.g., "checkpoint:persist").
    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateTransaction => "txn:create",
            Action::CommitTransaction => "txn:commit",
            Action::RollbackTransaction => "txn:rollback",
            Action::TrackTransaction { .. } => "txn:track",
            Action::PersistCheckpoint { .. } => "checkpoint:persist",
            Action::RemoveCheckpoint { .. } => "checkpoint:remove",
            Action::PersistDeduplicationFacts { .. } => "dedup:persist",
            Action::RecordResult { .. } => "result:record",
            Action::AcknowledgeMessages { .. } => "bus:ack",
            Action::SendInitial { .. } => "bus:send-initial",
            Action::SendExisting { .. } => "bus:send-existing",
            Action::SendMultiple { .. } => "bus:send-multiple",
            Action::PropagateErrors { .. } => "bus:propagate-errors",
            Action::ScheduleFlowTimeout { .. } => "timer:schedule",
            Action::CancelFlowTimeout { .. } => "timer:cancel",
            Action::SleepUntil { .. } => "timer:sleep",
            Action::ExecuteAsyncOperation { .. } => "op:execute",
            Action::ReleaseSoftLocks { .. } => "locks:release",
            Action::RetryFlowFromSafePoint { .. } => "flow:retry-from-safe-point",
            Action::RemoveSessionBindings { .. } => "session:remove-bindings",
            Action::RemoveFlow { .. } => "flow:remove",
        }
    }

    /// Key-value pairs for structured logging
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Action::PersistCheckpoint {
                id,
                checkpoint,
                is_update,
            } => vec![
                ("flow_id", id.short()),
                (
                    "num_commits",
                    checkpoint.checkpoint_state.num_commits.to_string(),
                ),
                ("is_update", is_update.to_string()),
            ],
            Action::RemoveCheckpoint {
                id,
                may_have_persistent_results,
            } => vec![
                ("flow_id", id.short()),
                ("keep_results", may_have_persistent_results.to_string()),
            ],
            Action::PersistDeduplicationFacts { facts } => {
                vec![("facts", facts.len().to_string())]
            }
            Action::RecordResult { client_id, .. } => {
                vec![("client_id", client_id.to_string())]
            }
            Action::AcknowledgeMessages { handlers } => {
                vec![("handlers", handlers.len().to_string())]
            }
            Action::SendInitial {
                destination,
                initiator_session_id,
                flow_name,
                ..
            } => vec![
                ("destination", destination.to_string()),
                ("session_id", initiator_session_id.to_string()),
                ("flow_name", flow_name.clone()),
            ],
            Action::SendExisting { send } => vec![
                ("peer", send.peer.to_string()),
                ("session_id", send.recipient_session_id.to_string()),
                ("payload", send.payload.name().to_string()),
            ],
            Action::SendMultiple { sends } => vec![("sends", sends.len().to_string())],
            Action::PropagateErrors {
                messages, sessions, ..
            } => vec![
                ("errors", messages.len().to_string()),
                ("sessions", sessions.len().to_string()),
            ],
            Action::ScheduleFlowTimeout { id }
            | Action::CancelFlowTimeout { id }
            | Action::ReleaseSoftLocks { id }
            | Action::TrackTransaction { id }
            | Action::RetryFlowFromSafePoint { id } => vec![("flow_id", id.short())],
            Action::SleepUntil {
                id, until_epoch_ms, ..
            } => vec![
                ("flow_id", id.short()),
                ("until_epoch_ms", until_epoch_ms.to_string()),
            ],
            Action::ExecuteAsyncOperation {
                id,
                op_seq,
                operation,
            } => vec![
                ("flow_id", id.short()),
                ("op_seq", op_seq.to_string()),
                ("operation", operation.name.clone()),
            ],
            Action::RemoveSessionBindings { session_ids } => {
                vec![("sessions", session_ids.len().to_string())]
            }
            Action::RemoveFlow { id, outcome } => vec![
                ("flow_id", id.short()),
                (
                    "outcome",
                    match outcome {
                        FlowOutcome::OrderlyFinish { .. } => "orderly".to_string(),
                        FlowOutcome::ErrorFinish { errors } => {
                            format!("errored({})", errors.len())
                        }
                    },
                ),
            ],
            Action::CreateTransaction
            | Action::CommitTransaction
            | Action::RollbackTransaction => vec![],
        }
    }

    /// Whether to show both 'started' and 'completed' or just 'executed',
    /// to control the verbosity for frequent actions.
    pub fn verbose(&self) -> bool {
        match self {
            // Bracketing and bookkeeping actions fire on every transition
            Action::CreateTransaction
            | Action::CommitTransaction
            | Action::TrackTransaction { .. }
            | Action::PersistCheckpoint { .. }
            | Action::PersistDeduplicationFacts { .. }
            | Action::AcknowledgeMessages { .. } => false,
            // Full detail for infrequent and destructive actions
            _ => true,
        }
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
