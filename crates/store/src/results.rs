// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client result store.
//!
//! Flows started with a `client_id` leave their outcome here when they
//! finish, so clients can fetch results after the flow itself is gone.

use crate::error::StoreError;
use parking_lot::Mutex;
use skein_core::{ClientId, FlowOutcome};
use std::collections::HashMap;

pub trait ResultStore: Send + Sync {
    fn record(&self, client_id: &ClientId, outcome: &FlowOutcome) -> Result<(), StoreError>;

    fn get(&self, client_id: &ClientId) -> Result<Option<FlowOutcome>, StoreError>;
}

/// In-memory result store.
#[derive(Default)]
pub struct MemoryResultStore {
    rows: Mutex<HashMap<ClientId, FlowOutcome>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn record(&self, client_id: &ClientId, outcome: &FlowOutcome) -> Result<(), StoreError> {
        self.rows
            .lock()
            .insert(client_id.clone(), outcome.clone());
        Ok(())
    }

    fn get(&self, client_id: &ClientId) -> Result<Option<FlowOutcome>, StoreError> {
        Ok(self.rows.lock().get(client_id).cloned())
    }
}

#[cfg(test)]
#[path = "results_tests.rs"]
mod tests;
