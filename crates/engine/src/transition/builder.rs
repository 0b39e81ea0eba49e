// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition builder.
//!
//! Every rule constructs its result through this builder, which owns the
//! ordering discipline: persistence actions sit inside exactly one
//! `CreateTransaction`/`CommitTransaction` bracket, acknowledgements come
//! only after the commit, and a rule that changes nothing emits nothing.

use super::TransitionContext;
use skein_core::{
    Action, Checkpoint, Continuation, DedupHandler, DedupId, FlowOutcome, MachineState,
    TransitionResult,
};

pub(crate) struct TransitionBuilder<'a> {
    pub(crate) ctx: &'a TransitionContext,
    pub(crate) state: MachineState,
    actions: Vec<Action>,
}

impl<'a> TransitionBuilder<'a> {
    pub fn new(ctx: &'a TransitionContext, initial: &MachineState) -> Self {
        Self {
            ctx,
            state: initial.clone(),
            actions: Vec::new(),
        }
    }

    pub fn checkpoint(&mut self) -> &mut Checkpoint {
        &mut self.state.checkpoint
    }

    pub fn action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Allocate the dedup id for an outbound message from this flow.
    pub fn allocate_send_dedup(&mut self) -> DedupId {
        let seq = self.state.checkpoint.next_dedup_seq();
        DedupId::Message {
            sender: self.ctx.id,
            seq,
        }
    }

    /// Register an inbound delivery. Returns false when the dedup id is
    /// already pending in the uncommitted window — the handler is still
    /// queued for acknowledgement, but the message must not be re-applied.
    pub fn record_inbound(&mut self, handler: &DedupHandler) -> bool {
        let fresh = !self
            .state
            .checkpoint
            .pending_deduplication_facts
            .contains(&handler.dedup_id);
        if fresh {
            self.state
                .checkpoint
                .pending_deduplication_facts
                .push(handler.dedup_id.clone());
        }
        self.state.unacked_handlers.push(handler.clone());
        fresh
    }

    /// Standard durable commit: bump the commit counter, persist the
    /// checkpoint with its pending facts inside one transaction, then
    /// acknowledge the handlers those facts came from.
    pub fn commit_checkpoint(&mut self) {
        let cp = &mut self.state.checkpoint;
        cp.checkpoint_state.num_commits += 1;
        let is_update = cp.checkpoint_state.num_commits > 1;
        let facts = std::mem::take(&mut cp.pending_deduplication_facts);
        let snapshot = cp.clone();
        let handlers = std::mem::take(&mut self.state.unacked_handlers);

        self.action(Action::CreateTransaction);
        self.action(Action::TrackTransaction { id: self.ctx.id });
        self.action(Action::PersistCheckpoint {
            id: self.ctx.id,
            checkpoint: Box::new(snapshot),
            is_update,
        });
        if !facts.is_empty() {
            self.action(Action::PersistDeduplicationFacts { facts });
        }
        self.action(Action::CommitTransaction);
        if !handlers.is_empty() {
            self.action(Action::AcknowledgeMessages { handlers });
        }
    }

    /// Commit only dedup facts and acknowledgements. Used by a flow whose
    /// checkpoint is already removed but which still processes messages
    /// while flushing buffered errors.
    pub fn commit_facts_only(&mut self) {
        let facts = std::mem::take(&mut self.state.checkpoint.pending_deduplication_facts);
        let handlers = std::mem::take(&mut self.state.unacked_handlers);
        if facts.is_empty() && handlers.is_empty() {
            return;
        }
        self.action(Action::CreateTransaction);
        if !facts.is_empty() {
            self.action(Action::PersistDeduplicationFacts { facts });
        }
        self.action(Action::CommitTransaction);
        if !handlers.is_empty() {
            self.action(Action::AcknowledgeMessages { handlers });
        }
    }

    /// Terminal commit for a finishing, erroring, or killed flow.
    ///
    /// With `keep_row`, the checkpoint survives in its terminal status (a
    /// client will come back for it); otherwise the row is removed, keeping
    /// persisted results only when a client id exists.
    pub fn terminal_commit(&mut self, outcome: &FlowOutcome, keep_row: bool) {
        let cp = &mut self.state.checkpoint;
        cp.checkpoint_state.num_commits += 1;
        let facts = std::mem::take(&mut cp.pending_deduplication_facts);
        let client_id = cp.client_id().cloned();
        let snapshot = cp.clone();
        let handlers = std::mem::take(&mut self.state.unacked_handlers);

        self.action(Action::CreateTransaction);
        self.action(Action::TrackTransaction { id: self.ctx.id });
        if keep_row {
            self.action(Action::PersistCheckpoint {
                id: self.ctx.id,
                checkpoint: Box::new(snapshot),
                is_update: true,
            });
        } else {
            self.action(Action::RemoveCheckpoint {
                id: self.ctx.id,
                may_have_persistent_results: client_id.is_some(),
            });
        }
        if let Some(client_id) = client_id {
            self.action(Action::RecordResult {
                client_id,
                outcome: outcome.clone(),
            });
        }
        if !facts.is_empty() {
            self.action(Action::PersistDeduplicationFacts { facts });
        }
        self.action(Action::ReleaseSoftLocks { id: self.ctx.id });
        self.action(Action::CommitTransaction);
        if !handlers.is_empty() {
            self.action(Action::AcknowledgeMessages { handlers });
        }
    }

    pub fn finish(self, continuation: Continuation) -> TransitionResult {
        #[cfg(debug_assertions)]
        validate_ordering(&self.actions);
        TransitionResult {
            state: self.state,
            actions: self.actions,
            continuation,
        }
    }
}

/// Ordering rules the executor relies on: at most one transaction bracket,
/// persistence only inside it, acknowledgements only after the commit.
#[cfg(debug_assertions)]
fn validate_ordering(actions: &[Action]) {
    let mut in_txn = false;
    let mut committed = false;
    for action in actions {
        match action {
            Action::CreateTransaction => {
                debug_assert!(!in_txn && !committed, "second CreateTransaction in one list");
                in_txn = true;
            }
            Action::CommitTransaction => {
                debug_assert!(in_txn, "CommitTransaction without CreateTransaction");
                in_txn = false;
                committed = true;
            }
            Action::RollbackTransaction => {
                in_txn = false;
            }
            Action::PersistCheckpoint { .. }
            | Action::RemoveCheckpoint { .. }
            | Action::PersistDeduplicationFacts { .. }
            | Action::RecordResult { .. }
            | Action::ReleaseSoftLocks { .. }
            | Action::TrackTransaction { .. } => {
                debug_assert!(in_txn, "persistence action outside transaction: {}", action.name());
            }
            Action::AcknowledgeMessages { .. } => {
                debug_assert!(committed, "acknowledgement before commit");
            }
            _ => {}
        }
    }
    debug_assert!(!in_txn, "transaction left open");
}
