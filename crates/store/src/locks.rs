// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Soft locks: advisory locks on state consumed by a running flow,
//! released in bulk when the flow terminates.

use parking_lot::Mutex;
use skein_core::FlowId;
use std::collections::HashMap;

#[derive(Default)]
pub struct SoftLockRegistry {
    // lock key -> holding flow
    holders: Mutex<HashMap<String, FlowId>>,
}

impl SoftLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take a lock for a flow. Returns false if another flow holds
    /// it; re-acquisition by the same flow succeeds.
    pub fn acquire(&self, flow_id: FlowId, key: impl Into<String>) -> bool {
        let key = key.into();
        let mut holders = self.holders.lock();
        match holders.get(&key) {
            Some(holder) if *holder != flow_id => false,
            _ => {
                holders.insert(key, flow_id);
                true
            }
        }
    }

    pub fn holder(&self, key: &str) -> Option<FlowId> {
        self.holders.lock().get(key).copied()
    }

    /// Release every lock held by the flow. Returns how many were released.
    pub fn release_all(&self, flow_id: &FlowId) -> usize {
        let mut holders = self.holders.lock();
        let before = holders.len();
        holders.retain(|_, holder| holder != flow_id);
        before - holders.len()
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
