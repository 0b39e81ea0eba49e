// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint store: at most one durable checkpoint per flow, replaced
//! optimistically by the strictly-monotone commit counter.

use crate::error::StoreError;
use parking_lot::Mutex;
use skein_core::{Checkpoint, CheckpointStatus, FlowId};
use std::collections::HashMap;

/// Durable checkpoint storage.
pub trait CheckpointStore: Send + Sync {
    fn get(&self, id: &FlowId) -> Result<Option<Checkpoint>, StoreError>;

    /// Upsert keyed by `(id, num_commits)`. Rejects upserts whose
    /// `num_commits` is not strictly greater than the stored one.
    fn upsert(&self, id: FlowId, num_commits: u64, checkpoint: &Checkpoint)
        -> Result<(), StoreError>;

    /// Delete the checkpoint row. Recorded results survive iff
    /// `may_have_results`.
    fn remove(&self, id: &FlowId, may_have_results: bool) -> Result<(), StoreError>;

    /// Operator-driven status change; leaves the commit counter untouched.
    fn update_status(&self, id: &FlowId, status: CheckpointStatus) -> Result<(), StoreError>;

    /// Flows currently in the store, optionally filtered by status.
    fn list(&self, filter: Option<CheckpointStatus>)
        -> Result<Vec<(FlowId, CheckpointStatus)>, StoreError>;
}

/// In-memory checkpoint store for tests and embedded use.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    rows: Mutex<HashMap<FlowId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, id: &FlowId) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.rows.lock().get(id).cloned())
    }

    fn upsert(
        &self,
        id: FlowId,
        num_commits: u64,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if let Some(existing) = rows.get(&id) {
            let stored = existing.checkpoint_state.num_commits;
            if num_commits <= stored {
                return Err(StoreError::StaleCheckpoint {
                    id,
                    stored,
                    supplied: num_commits,
                });
            }
        }
        rows.insert(id, checkpoint.clone());
        Ok(())
    }

    fn remove(&self, id: &FlowId, _may_have_results: bool) -> Result<(), StoreError> {
        self.rows.lock().remove(id);
        Ok(())
    }

    fn update_status(&self, id: &FlowId, status: CheckpointStatus) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let row = rows.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        row.status = status;
        Ok(())
    }

    fn list(
        &self,
        filter: Option<CheckpointStatus>,
    ) -> Result<Vec<(FlowId, CheckpointStatus)>, StoreError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|(_, cp)| filter.is_none_or(|f| cp.status == f))
            .map(|(id, cp)| (*id, cp.status))
            .collect())
    }
}

#[cfg(test)]
#[path = "checkpoint_store_tests.rs"]
mod tests;
