// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped transactions over the durable stores.
//!
//! A [`Txn`] buffers writes until `commit()`, which applies them as one
//! unit under the manager's commit lock. Dropping an uncommitted
//! transaction rolls it back — release is guaranteed on every exit path.

use crate::checkpoint_store::CheckpointStore;
use crate::dedup_log::DedupLog;
use crate::error::StoreError;
use crate::results::ResultStore;
use parking_lot::Mutex;
use skein_core::{Checkpoint, ClientId, DedupId, FlowId, FlowOutcome};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Requested isolation for a transaction. The stores provide
/// read-committed semantics; the variant exists so callers state intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
}

enum StoreOp {
    UpsertCheckpoint {
        id: FlowId,
        num_commits: u64,
        checkpoint: Box<Checkpoint>,
    },
    RemoveCheckpoint {
        id: FlowId,
        may_have_results: bool,
    },
    InsertDedupFacts {
        facts: Vec<DedupId>,
    },
    RecordResult {
        client_id: ClientId,
        outcome: FlowOutcome,
    },
}

/// Factory for scoped transactions, plus the live-transaction registry
/// (flow id → open transaction id).
pub struct TxnManager {
    checkpoints: Arc<dyn CheckpointStore>,
    dedup: Arc<dyn DedupLog>,
    results: Arc<dyn ResultStore>,
    live: Mutex<HashMap<FlowId, u64>>,
    commit_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl TxnManager {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        dedup: Arc<dyn DedupLog>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            checkpoints,
            dedup,
            results,
            live: Mutex::new(HashMap::new()),
            commit_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a scoped transaction over this manager.
    pub fn begin(manager: &Arc<TxnManager>, _isolation: IsolationLevel) -> Txn {
        Txn {
            id: manager.next_id.fetch_add(1, Ordering::Relaxed),
            manager: Arc::clone(manager),
            ops: Vec::new(),
            open: true,
        }
    }

    /// Record that a flow's transition currently holds an open transaction.
    fn track(&self, flow_id: FlowId, txn_id: u64) {
        self.live.lock().insert(flow_id, txn_id);
    }

    fn untrack(&self, txn_id: u64) {
        self.live.lock().retain(|_, id| *id != txn_id);
    }

    /// The open transaction id for a flow, if any.
    pub fn live_txn(&self, flow_id: &FlowId) -> Option<u64> {
        self.live.lock().get(flow_id).copied()
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    pub fn dedup(&self) -> &Arc<dyn DedupLog> {
        &self.dedup
    }

    pub fn results(&self) -> &Arc<dyn ResultStore> {
        &self.results
    }
}

/// One open transaction. Writes are buffered; nothing reaches the stores
/// until `commit()`.
pub struct Txn {
    id: u64,
    manager: Arc<TxnManager>,
    ops: Vec<StoreOp>,
    open: bool,
}

impl Txn {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register this transaction in the live registry for its flow.
    pub fn track(&mut self, flow_id: FlowId) {
        self.manager.track(flow_id, self.id);
    }

    /// Buffer a checkpoint upsert. The version is validated eagerly against
    /// the committed state (read-committed view) and again at commit.
    pub fn persist_checkpoint(
        &mut self,
        id: FlowId,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let num_commits = checkpoint.checkpoint_state.num_commits;
        if let Some(existing) = self.manager.checkpoints.get(&id)? {
            let stored = existing.checkpoint_state.num_commits;
            if num_commits <= stored {
                return Err(StoreError::StaleCheckpoint {
                    id,
                    stored,
                    supplied: num_commits,
                });
            }
        }
        self.ops.push(StoreOp::UpsertCheckpoint {
            id,
            num_commits,
            checkpoint: Box::new(checkpoint.clone()),
        });
        Ok(())
    }

    pub fn remove_checkpoint(
        &mut self,
        id: FlowId,
        may_have_results: bool,
    ) -> Result<(), StoreError> {
        self.ops.push(StoreOp::RemoveCheckpoint {
            id,
            may_have_results,
        });
        Ok(())
    }

    pub fn insert_dedup_facts(&mut self, facts: Vec<DedupId>) -> Result<(), StoreError> {
        if !facts.is_empty() {
            self.ops.push(StoreOp::InsertDedupFacts { facts });
        }
        Ok(())
    }

    pub fn record_result(
        &mut self,
        client_id: ClientId,
        outcome: FlowOutcome,
    ) -> Result<(), StoreError> {
        self.ops.push(StoreOp::RecordResult { client_id, outcome });
        Ok(())
    }

    /// Apply all buffered writes as one unit. A version conflict aborts the
    /// whole transaction with nothing applied.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.open = false;

        let manager = Arc::clone(&self.manager);
        let _commit_guard = manager.commit_lock.lock();

        // Validate every upsert before applying anything
        for op in &self.ops {
            if let StoreOp::UpsertCheckpoint {
                id, num_commits, ..
            } = op
            {
                if let Some(existing) = manager.checkpoints.get(id)? {
                    let stored = existing.checkpoint_state.num_commits;
                    if *num_commits <= stored {
                        manager.untrack(self.id);
                        return Err(StoreError::StaleCheckpoint {
                            id: *id,
                            stored,
                            supplied: *num_commits,
                        });
                    }
                }
            }
        }

        for op in self.ops.drain(..) {
            match op {
                StoreOp::UpsertCheckpoint {
                    id,
                    num_commits,
                    checkpoint,
                } => manager.checkpoints.upsert(id, num_commits, &checkpoint)?,
                StoreOp::RemoveCheckpoint {
                    id,
                    may_have_results,
                } => manager.checkpoints.remove(&id, may_have_results)?,
                StoreOp::InsertDedupFacts { facts } => {
                    manager.dedup.insert_all(&facts)?;
                }
                StoreOp::RecordResult { client_id, outcome } => {
                    manager.results.record(&client_id, &outcome)?;
                }
            }
        }

        manager.untrack(self.id);
        Ok(())
    }

    /// Discard all buffered writes.
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if self.open {
            self.open = false;
            self.ops.clear();
            self.manager.untrack(self.id);
        }
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        if self.open {
            tracing::debug!(txn_id = self.id, "rolling back dropped transaction");
            self.discard();
        }
    }
}

#[cfg(test)]
#[path = "txn_tests.rs"]
mod tests;
