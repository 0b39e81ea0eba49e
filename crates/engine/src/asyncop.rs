// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async operation runner.
//!
//! Flows suspend on named operations; the runner resolves the name against
//! a registry, executes it off the fiber, and surfaces the completion as an
//! `AsyncOpCompleted` event with the flow's operation sequence number. A
//! retried flow re-submits with the same sequence, so downstream systems
//! can deduplicate.

use async_trait::async_trait;
use skein_core::{Event, FlowException, FlowId, OpOutcome, OperationSpec};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// An externally-executed operation a flow can await.
#[async_trait]
pub trait AsyncOperation: Send + Sync {
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, FlowException>;
}

/// Named operations available to flows on this node.
#[derive(Default, Clone)]
pub struct OperationRegistry {
    ops: HashMap<String, Arc<dyn AsyncOperation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, op: Arc<dyn AsyncOperation>) {
        self.ops.insert(name.into(), op);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AsyncOperation>> {
        self.ops.get(name).cloned()
    }

    /// Run the operation in the background and feed the completion into
    /// the flow's mailbox.
    pub fn submit(&self, flow_id: FlowId, op_seq: u64, spec: OperationSpec, tx: mpsc::Sender<Event>) {
        let op = self.get(&spec.name);
        tokio::spawn(async move {
            let outcome = match op {
                Some(op) => match op.execute(spec.params).await {
                    Ok(result) => OpOutcome::Completed { result },
                    Err(exception) => OpOutcome::Failed { exception },
                },
                None => OpOutcome::Failed {
                    exception: FlowException::new(format!("unknown operation '{}'", spec.name)),
                },
            };
            if tx
                .send(Event::AsyncOpCompleted { op_seq, outcome })
                .await
                .is_err()
            {
                tracing::debug!(flow_id = %flow_id.short(), op_seq, "operation completed for gone flow");
            }
        });
    }
}

#[cfg(test)]
#[path = "asyncop_tests.rs"]
mod tests;
