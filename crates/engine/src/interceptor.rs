// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interceptor chain around the transition executor.
//!
//! Interceptors wrap the pure transition with diagnostics and supervision
//! concerns. Composition is an explicit ordered list of wrappers, each
//! delegating to the next.

use crate::transition::{transition, TransitionContext};
use parking_lot::Mutex;
use skein_core::{
    CheckpointStatus, Clock, ErrorState, Event, FlowId, MachineState, TransitionResult,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Something that can run a transition. The base executor is the pure
/// function; every interceptor is also one of these, wrapping another.
pub trait TransitionExecutor: Send + Sync {
    fn execute_transition(
        &self,
        ctx: &TransitionContext,
        state: &MachineState,
        event: &Event,
    ) -> TransitionResult;
}

/// The innermost executor: the pure transition function itself.
pub struct BaseTransitionExecutor;

impl TransitionExecutor for BaseTransitionExecutor {
    fn execute_transition(
        &self,
        ctx: &TransitionContext,
        state: &MachineState,
        event: &Event,
    ) -> TransitionResult {
        transition(ctx, state, event)
    }
}

/// A wrapper around the transition executor. Implementations run `next`,
/// then observe or rewrite its result.
pub trait TransitionInterceptor: Send + Sync {
    fn intercept(
        &self,
        ctx: &TransitionContext,
        state: &MachineState,
        event: &Event,
        next: &dyn TransitionExecutor,
    ) -> TransitionResult;
}

struct Wrapped {
    interceptor: Arc<dyn TransitionInterceptor>,
    next: Arc<dyn TransitionExecutor>,
}

impl TransitionExecutor for Wrapped {
    fn execute_transition(
        &self,
        ctx: &TransitionContext,
        state: &MachineState,
        event: &Event,
    ) -> TransitionResult {
        self.interceptor
            .intercept(ctx, state, event, self.next.as_ref())
    }
}

/// Compose interceptors around the base executor. The first interceptor in
/// the list is the outermost wrapper.
pub fn build_chain(interceptors: Vec<Arc<dyn TransitionInterceptor>>) -> Arc<dyn TransitionExecutor> {
    let mut current: Arc<dyn TransitionExecutor> = Arc::new(BaseTransitionExecutor);
    for interceptor in interceptors.into_iter().rev() {
        current = Arc::new(Wrapped {
            interceptor,
            next: current,
        });
    }
    current
}

/// One retained trace entry.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub at_epoch_ms: u64,
    pub event: String,
    pub prev_status: CheckpointStatus,
    pub next_status: CheckpointStatus,
    pub actions: Vec<&'static str>,
    pub continuation: String,
}

/// Per-flow bounded trace of transitions. Dumped to the log when a flow
/// starts propagating errors; purged when the flow is removed.
pub struct HistoryRecorder<C: Clock> {
    clock: C,
    capacity: usize,
    histories: Mutex<HashMap<FlowId, VecDeque<HistoryRecord>>>,
}

impl<C: Clock> HistoryRecorder<C> {
    pub fn new(clock: C, capacity: usize) -> Self {
        Self {
            clock,
            capacity,
            histories: Mutex::new(HashMap::new()),
        }
    }

    pub fn history(&self, flow_id: &FlowId) -> Vec<HistoryRecord> {
        self.histories
            .lock()
            .get(flow_id)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn dump(&self, flow_id: &FlowId) {
        for record in self.history(flow_id) {
            tracing::warn!(
                flow_id = %flow_id.short(),
                at = record.at_epoch_ms,
                event = %record.event,
                ?record.prev_status,
                ?record.next_status,
                continuation = %record.continuation,
                "transition trace"
            );
        }
    }
}

impl<C: Clock> TransitionInterceptor for HistoryRecorder<C> {
    fn intercept(
        &self,
        ctx: &TransitionContext,
        state: &MachineState,
        event: &Event,
        next: &dyn TransitionExecutor,
    ) -> TransitionResult {
        let result = next.execute_transition(ctx, state, event);

        let record = HistoryRecord {
            at_epoch_ms: self.clock.epoch_ms(),
            event: event.log_summary(),
            prev_status: state.checkpoint.status,
            next_status: result.state.checkpoint.status,
            actions: result.actions.iter().map(|a| a.name()).collect(),
            continuation: format!("{:?}", result.continuation),
        };
        {
            let mut histories = self.histories.lock();
            let records = histories.entry(ctx.id).or_default();
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }

        let propagating = matches!(
            result.state.checkpoint.error_state,
            ErrorState::Errored {
                propagating: true,
                ..
            }
        );
        let was_propagating = matches!(
            state.checkpoint.error_state,
            ErrorState::Errored {
                propagating: true,
                ..
            }
        );
        if propagating && !was_propagating {
            self.dump(&ctx.id);
        }
        if result.state.removed {
            self.histories.lock().remove(&ctx.id);
        }

        result
    }
}

/// Routes internal-error transitions into the hospital's supervision
/// domain by marking the checkpoint hospitalized instead of letting the
/// ordinary propagation path claim it.
pub struct Hospitaliser;

impl TransitionInterceptor for Hospitaliser {
    fn intercept(
        &self,
        ctx: &TransitionContext,
        state: &MachineState,
        event: &Event,
        next: &dyn TransitionExecutor,
    ) -> TransitionResult {
        let mut result = next.execute_transition(ctx, state, event);
        if let Event::Error { error } = event {
            if error.needs_hospital() && !result.state.checkpoint.status.is_terminal() {
                result.state.checkpoint.status = CheckpointStatus::Hospitalized;
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "interceptor_tests.rs"]
mod tests;
