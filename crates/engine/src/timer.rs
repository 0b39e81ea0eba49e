// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer service: per-flow timeouts and sleep wakeups.
//!
//! Scheduling is idempotent per (flow, kind): a second schedule replaces
//! the first. Firing enqueues the matching event into the flow's mailbox.

use parking_lot::Mutex;
use skein_core::{Clock, Event, FlowId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What a timer means when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Flow-level timeout; fires a retry-from-safe-point.
    FlowTimeout,
    /// A `SleepUntil` suspension elapsing.
    Sleep,
}

impl TimerKind {
    fn event(&self) -> Event {
        match self {
            TimerKind::FlowTimeout => Event::FlowTimeout,
            TimerKind::Sleep => Event::SleepFinished,
        }
    }
}

/// Schedules wall-clock wakeups for flows.
pub trait TimerService: Send + Sync {
    /// Schedule (or replace) the timer of this kind for the flow. The
    /// matching event is sent into `tx` when the deadline passes.
    fn schedule(&self, flow_id: FlowId, kind: TimerKind, at_epoch_ms: u64, tx: mpsc::Sender<Event>);

    /// Cancel the timer of this kind, if scheduled.
    fn cancel(&self, flow_id: FlowId, kind: TimerKind);

    /// Cancel everything for a flow (it is being removed).
    fn cancel_all(&self, flow_id: FlowId);
}

/// Tokio-backed timer service.
pub struct TokioTimerService<C: Clock> {
    clock: C,
    handles: Mutex<HashMap<(FlowId, TimerKind), CancellationToken>>,
}

impl<C: Clock> TokioTimerService<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            handles: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Clock + 'static> TimerService for TokioTimerService<C> {
    fn schedule(
        &self,
        flow_id: FlowId,
        kind: TimerKind,
        at_epoch_ms: u64,
        tx: mpsc::Sender<Event>,
    ) {
        let token = CancellationToken::new();
        let delay = Duration::from_millis(at_epoch_ms.saturating_sub(self.clock.epoch_ms()));

        if let Some(previous) = self
            .handles
            .lock()
            .insert((flow_id, kind), token.clone())
        {
            previous.cancel();
        }

        tokio::spawn({
            let token = token.clone();
            async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        if tx.send(kind.event()).await.is_err() {
                            tracing::debug!(flow_id = %flow_id.short(), "timer fired for gone flow");
                        }
                    }
                }
            }
        });
    }

    fn cancel(&self, flow_id: FlowId, kind: TimerKind) {
        if let Some(token) = self.handles.lock().remove(&(flow_id, kind)) {
            token.cancel();
        }
    }

    fn cancel_all(&self, flow_id: FlowId) {
        let mut handles = self.handles.lock();
        handles.retain(|(id, _), token| {
            if *id == flow_id {
                token.cancel();
                false
            } else {
                true
            }
        });
    }
}

/// Manually fired timer service for deterministic tests.
#[derive(Default)]
pub struct ManualTimerService {
    scheduled: Mutex<HashMap<(FlowId, TimerKind), (u64, mpsc::Sender<Event>)>>,
}

impl ManualTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scheduled(&self, flow_id: FlowId, kind: TimerKind) -> bool {
        self.scheduled.lock().contains_key(&(flow_id, kind))
    }

    /// Fire a scheduled timer now, regardless of its deadline.
    pub async fn fire(&self, flow_id: FlowId, kind: TimerKind) -> bool {
        let entry = self.scheduled.lock().remove(&(flow_id, kind));
        match entry {
            Some((_, tx)) => tx.send(kind.event()).await.is_ok(),
            None => false,
        }
    }
}

impl TimerService for ManualTimerService {
    fn schedule(
        &self,
        flow_id: FlowId,
        kind: TimerKind,
        at_epoch_ms: u64,
        tx: mpsc::Sender<Event>,
    ) {
        self.scheduled
            .lock()
            .insert((flow_id, kind), (at_epoch_ms, tx));
    }

    fn cancel(&self, flow_id: FlowId, kind: TimerKind) {
        self.scheduled.lock().remove(&(flow_id, kind));
    }

    fn cancel_all(&self, flow_id: FlowId) {
        self.scheduled.lock().retain(|(id, _), _| *id != flow_id);
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
