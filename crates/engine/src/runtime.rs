// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: owns the fiber arena, routes inbound messages by session
//! binding, drives each flow's event loop, and recovers flows from the
//! checkpoint store after a restart.
//!
//! Concurrency model: one tokio task per flow, consuming a private
//! mailbox, so a flow's events are strictly serialised while flows run in
//! parallel. Sessions reference flows only through the `SessionId →
//! FlowId` binding map.

use crate::asyncop::OperationRegistry;
use crate::bus::{Delivery, MessageBus};
use crate::config::EngineConfig;
use crate::error::{EngineError, ExecuteError};
use crate::executor::{ActionExecutor, Directive, ExecutorDeps};
use crate::fiber::{FlowCtx, FlowLogic, FlowRegistry};
use crate::hospital::{FlowHospital, HospitalCommand, HospitalReport};
use crate::interceptor::{build_chain, HistoryRecorder, Hospitaliser, TransitionExecutor};
use crate::timer::{TimerKind, TimerService};
use crate::transition::{try_resume, TransitionContext};
use chrono::DateTime;
use parking_lot::Mutex;
use skein_core::{
    Checkpoint, ClientId, Clock, ErrorCause, Event, FlowError, FlowFrame, FlowId, FlowOrigin,
    FlowOutcome, FlowRequest, FlowState, FlowYield, InvocationContext, MachineState, PartyId,
    ResumeValue, SessionId, SessionState, SuspendReason,
};
use skein_store::{CheckpointStore, DedupLog, ResultStore, SoftLockRegistry, StoreError,
    TxnManager};
use skein_wire::{InitialSessionMessage, SessionMessage};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const MAILBOX_DEPTH: usize = 64;

/// Durable and transport collaborators an engine is built over.
pub struct EngineDeps {
    pub bus: Arc<dyn MessageBus>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub dedup: Arc<dyn DedupLog>,
    pub results: Arc<dyn ResultStore>,
    pub timers: Arc<dyn TimerService>,
    pub hospital: Arc<dyn FlowHospital>,
}

struct FlowCell {
    events: mpsc::Sender<Event>,
    task: JoinHandle<()>,
}

pub(crate) struct EngineInner<C: Clock> {
    config: EngineConfig,
    party: PartyId,
    clock: C,
    registry: FlowRegistry,
    txns: Arc<TxnManager>,
    executor_deps: Arc<ExecutorDeps>,
    hospital: Arc<dyn FlowHospital>,
    chain: Arc<dyn TransitionExecutor>,
    flows: Mutex<HashMap<FlowId, FlowCell>>,
    bindings: Mutex<HashMap<SessionId, FlowId>>,
    /// Final outcomes, keyed by flow. Kept across retries and after
    /// removal so late readers still observe the result.
    outcomes: Mutex<HashMap<FlowId, watch::Sender<Option<FlowOutcome>>>>,
    shutdown: CancellationToken,
}

/// One node's flow state machine engine.
pub struct Engine<C: Clock + 'static> {
    inner: Arc<EngineInner<C>>,
}

impl<C: Clock + 'static> Clone for Engine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock + 'static> Engine<C> {
    pub fn new(
        config: EngineConfig,
        deps: EngineDeps,
        registry: FlowRegistry,
        operations: OperationRegistry,
        clock: C,
    ) -> Self {
        let party = PartyId::new(config.party.clone());
        let txns = Arc::new(TxnManager::new(
            Arc::clone(&deps.checkpoints),
            Arc::clone(&deps.dedup),
            Arc::clone(&deps.results),
        ));
        let executor_deps = Arc::new(ExecutorDeps {
            txns: Arc::clone(&txns),
            locks: Arc::new(SoftLockRegistry::new()),
            bus: Arc::clone(&deps.bus),
            timers: Arc::clone(&deps.timers),
            operations,
        });
        let chain = build_chain(vec![
            Arc::new(HistoryRecorder::new(
                clock.clone(),
                config.history_capacity,
            )),
            Arc::new(Hospitaliser),
        ]);
        Self {
            inner: Arc::new(EngineInner {
                config,
                party,
                clock,
                registry,
                txns,
                executor_deps,
                hospital: deps.hospital,
                chain,
                flows: Mutex::new(HashMap::new()),
                bindings: Mutex::new(HashMap::new()),
                outcomes: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn party(&self) -> &PartyId {
        &self.inner.party
    }

    /// Attach to the bus and start routing inbound messages.
    pub fn start(&self) {
        let inbox = self.inner.executor_deps.bus.register(self.inner.party.clone());
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.inbound_loop(inbox).await });
    }

    /// Start a new client-originated flow.
    pub fn start_flow(
        &self,
        flow_name: &str,
        args: serde_json::Value,
        client_id: Option<ClientId>,
    ) -> Result<FlowId, EngineError> {
        if !self.inner.registry.contains(flow_name) {
            return Err(EngineError::UnknownFlowName(flow_name.to_string()));
        }
        let id = FlowId::fresh();
        let checkpoint = Checkpoint::unstarted(
            id,
            InvocationContext {
                origin: FlowOrigin::Client { client_id },
                flow_name: flow_name.to_string(),
                args,
                started_at: DateTime::from_timestamp_millis(self.inner.clock.epoch_ms() as i64)
                    .unwrap_or(DateTime::UNIX_EPOCH),
            },
        );
        EngineInner::spawn_flow(
            &self.inner,
            MachineState::new(checkpoint),
            VecDeque::from([Event::Start]),
            None,
        )?;
        Ok(id)
    }

    /// Wait for a flow's final outcome.
    pub async fn flow_outcome(&self, id: FlowId) -> Result<FlowOutcome, EngineError> {
        let mut rx = {
            let outcomes = self.inner.outcomes.lock();
            outcomes
                .get(&id)
                .ok_or(EngineError::FlowNotFound(id))?
                .subscribe()
        };
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return Ok(outcome);
            }
            rx.changed()
                .await
                .map_err(|_| EngineError::FlowNotFound(id))?;
        }
    }

    /// Recover every runnable flow from the checkpoint store: rebuild the
    /// fiber, rebind sessions, re-arm timers and pending operations, and
    /// resume if the awaited state is already buffered.
    pub fn recover(&self) -> Result<usize, EngineError> {
        let runnable = self
            .inner
            .txns
            .checkpoints()
            .list(Some(skein_core::CheckpointStatus::Runnable))?;
        let mut recovered = 0;
        for (id, _) in runnable {
            if self.inner.flows.lock().contains_key(&id) {
                continue;
            }
            if EngineInner::respawn_from_store(&self.inner, id)? {
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    /// Operator view: flows in the checkpoint store by status.
    pub fn checkpoint_statuses(
        &self,
        filter: Option<skein_core::CheckpointStatus>,
    ) -> Result<Vec<(FlowId, skein_core::CheckpointStatus)>, EngineError> {
        Ok(self.inner.txns.checkpoints().list(filter)?)
    }

    pub async fn kill_flow(&self, id: FlowId) -> Result<(), EngineError> {
        self.inner.send_event(id, Event::Kill).await
    }

    pub async fn pause_flow(&self, id: FlowId) -> Result<(), EngineError> {
        self.inner.send_event(id, Event::Pause).await
    }

    /// Retry from the last committed checkpoint. A parked (paused or
    /// hospitalized) flow whose fiber is gone is revived from the store.
    pub async fn retry_flow(&self, id: FlowId) -> Result<(), EngineError> {
        if self
            .inner
            .send_event(id, Event::RetryFromSafePoint)
            .await
            .is_ok()
        {
            return Ok(());
        }
        self.inner
            .txns
            .checkpoints()
            .update_status(&id, skein_core::CheckpointStatus::Runnable)?;
        self.inner.flows.lock().remove(&id);
        if EngineInner::respawn_from_store(&self.inner, id)? {
            Ok(())
        } else {
            Err(EngineError::FlowNotFound(id))
        }
    }

    pub async fn propagate_flow_errors(&self, id: FlowId) -> Result<(), EngineError> {
        self.inner
            .send_event(id, Event::StartErrorPropagation)
            .await
    }

    /// Graceful drain: every flow parks at its committed suspension point.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let targets: Vec<mpsc::Sender<Event>> = self
            .inner
            .flows
            .lock()
            .values()
            .map(|cell| cell.events.clone())
            .collect();
        for tx in targets {
            let _ = tx.send(Event::SoftShutdown).await;
        }
    }

    /// Simulated crash: abort every task immediately, commit nothing.
    pub fn halt(&self) {
        self.inner.shutdown.cancel();
        let mut flows = self.inner.flows.lock();
        for (_, cell) in flows.drain() {
            cell.task.abort();
        }
    }
}

impl<C: Clock + 'static> EngineInner<C> {
    fn transition_ctx(&self, id: FlowId) -> TransitionContext {
        TransitionContext {
            id,
            party: self.party.clone(),
            timed: self.config.flow_timeout_ms.is_some(),
        }
    }

    async fn send_event(&self, id: FlowId, event: Event) -> Result<(), EngineError> {
        let tx = {
            let flows = self.flows.lock();
            flows
                .get(&id)
                .ok_or(EngineError::FlowNotFound(id))?
                .events
                .clone()
        };
        tx.send(event)
            .await
            .map_err(|_| EngineError::MailboxClosed(id))
    }

    /// Install a flow into the arena and spawn its driver task.
    fn spawn_flow(
        inner: &Arc<Self>,
        state: MachineState,
        pending: VecDeque<Event>,
        initial_resume: Option<ResumeValue>,
    ) -> Result<(), EngineError> {
        let id = state.checkpoint.id;
        let flow_name = state.checkpoint.invocation_context.flow_name.clone();
        let fiber = inner
            .registry
            .create(&flow_name)
            .ok_or(EngineError::UnknownFlowName(flow_name))?;

        {
            let mut bindings = inner.bindings.lock();
            for sid in state.checkpoint.checkpoint_state.sessions.keys() {
                bindings.insert(*sid, id);
            }
        }

        let initiator_session = match &state.checkpoint.invocation_context.origin {
            FlowOrigin::Peer {
                initiator_session_id,
                ..
            } => state
                .checkpoint
                .checkpoint_state
                .sessions
                .iter()
                .find_map(|(sid, session)| match session {
                    SessionState::Initiated {
                        peer_session_id, ..
                    } if peer_session_id == initiator_session_id => Some(*sid),
                    _ => None,
                }),
            FlowOrigin::Client { .. } => None,
        };

        let (event_tx, event_rx) = mpsc::channel(MAILBOX_DEPTH);
        let outcome_tx = {
            let mut outcomes = inner.outcomes.lock();
            outcomes
                .entry(id)
                .or_insert_with(|| watch::channel(None).0)
                .clone()
        };

        let executor = ActionExecutor::new(
            id,
            inner.party.clone(),
            inner.config.app_name.clone(),
            inner.config.platform_version,
            inner.config.flow_timeout_ms,
            Arc::clone(&inner.executor_deps),
            inner.clock.clone(),
            event_tx.clone(),
        );

        // A recovered suspension re-arms the external work it waits on:
        // timers and submitted operations did not survive the crash.
        if let FlowState::Started { reason, .. } = &state.checkpoint.flow_state {
            match reason {
                SuspendReason::SleepUntil { until_epoch_ms } => {
                    inner.executor_deps.timers.schedule(
                        id,
                        TimerKind::Sleep,
                        *until_epoch_ms,
                        event_tx.clone(),
                    );
                }
                SuspendReason::AwaitOperation { op_seq, operation } => {
                    inner.executor_deps.operations.submit(
                        id,
                        *op_seq,
                        operation.clone(),
                        event_tx.clone(),
                    );
                }
                SuspendReason::Receive { .. } | SuspendReason::Yield => {}
            }
            if let Some(timeout_ms) = inner.config.flow_timeout_ms {
                let deadline = inner.clock.epoch_ms() + timeout_ms;
                inner.executor_deps.timers.schedule(
                    id,
                    TimerKind::FlowTimeout,
                    deadline,
                    event_tx.clone(),
                );
            }
        }

        let driver = FlowDriver {
            inner: Arc::clone(inner),
            ctx: inner.transition_ctx(id),
            flow_ctx: FlowCtx {
                flow_id: id,
                party: inner.party.clone(),
                initiator_session,
            },
            fiber,
            state,
            executor,
            events: event_rx,
            internal: pending,
            outcome: outcome_tx,
        };
        let task = tokio::spawn(driver.run(initial_resume));

        inner.flows.lock().insert(id, FlowCell { events: event_tx, task });
        Ok(())
    }

    /// Rebuild one flow from its stored checkpoint (restart or retry from
    /// safe point). Returns false when no checkpoint row exists.
    fn respawn_from_store(inner: &Arc<Self>, id: FlowId) -> Result<bool, EngineError> {
        let Some(checkpoint) = inner.txns.checkpoints().get(&id)? else {
            return Ok(false);
        };
        let mut state = MachineState::new(checkpoint);

        let (pending, initial_resume) = match &state.checkpoint.flow_state {
            FlowState::Unstarted { .. } => (VecDeque::from([Event::Start]), None),
            FlowState::Started { .. } => {
                let resume = try_resume(&mut state);
                (VecDeque::new(), resume)
            }
            FlowState::Finished => (VecDeque::new(), None),
        };

        Self::spawn_flow(inner, state, pending, initial_resume)?;
        Ok(true)
    }

    async fn inbound_loop(self: Arc<Self>, mut inbox: mpsc::Receiver<Delivery>) {
        loop {
            let delivery = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                delivery = inbox.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            if let Err(e) = Self::route(&self, delivery).await {
                tracing::error!(error = %e, "failed to route inbound message");
            }
        }
    }

    async fn route(inner: &Arc<Self>, delivery: Delivery) -> Result<(), EngineError> {
        let Delivery { envelope, handler } = delivery;

        // Receive-side dedup: a durably recorded fact means the message
        // was fully processed in a committed checkpoint.
        if inner.txns.dedup().contains(&handler.dedup_id)? {
            tracing::debug!(dedup_id = %handler.dedup_id, "dropping already-processed delivery");
            inner.executor_deps.bus.ack(&handler);
            return Ok(());
        }

        match envelope.message {
            SessionMessage::Initial(initial) => {
                Self::create_responder(inner, envelope.sender, initial, handler)
            }
            SessionMessage::Existing(existing) => {
                let flow_id = {
                    let bindings = inner.bindings.lock();
                    bindings.get(&existing.recipient_session_id).copied()
                };
                let Some(flow_id) = flow_id else {
                    tracing::debug!(
                        session_id = %existing.recipient_session_id,
                        payload = existing.payload.name(),
                        "message for unbound session"
                    );
                    inner.executor_deps.bus.ack(&handler);
                    return Ok(());
                };
                let event = Event::MessageReceived {
                    session_id: existing.recipient_session_id,
                    payload: existing.payload,
                    handler,
                };
                match inner.send_event(flow_id, event).await {
                    Ok(()) => Ok(()),
                    Err(EngineError::FlowNotFound(_)) | Err(EngineError::MailboxClosed(_)) => {
                        // The flow finished between binding lookup and send.
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// A peer initiated a session: create the counterparty flow with an
    /// already-initiated session whose tokens are swapped with theirs.
    fn create_responder(
        inner: &Arc<Self>,
        sender: PartyId,
        initial: InitialSessionMessage,
        handler: skein_core::DedupHandler,
    ) -> Result<(), EngineError> {
        if !inner.registry.contains(&initial.flow_name) {
            tracing::warn!(
                flow_name = %initial.flow_name,
                sender = %sender,
                "no registered flow for initiating message"
            );
            inner.executor_deps.bus.ack(&handler);
            return Ok(());
        }

        let id = FlowId::fresh();
        let our_session_id = SessionId::fresh();
        let received_messages = match initial.payload {
            Some(body) => vec![(1, body)],
            None => Vec::new(),
        };

        let mut checkpoint = Checkpoint::unstarted(
            id,
            InvocationContext {
                origin: FlowOrigin::Peer {
                    party: sender.clone(),
                    initiator_session_id: initial.initiator_session_id,
                },
                flow_name: initial.flow_name,
                args: serde_json::Value::Null,
                started_at: DateTime::from_timestamp_millis(inner.clock.epoch_ms() as i64)
                    .unwrap_or(DateTime::UNIX_EPOCH),
            },
        );
        checkpoint.checkpoint_state.sessions.insert(
            our_session_id,
            SessionState::Initiated {
                our_session_id,
                peer_session_id: initial.initiator_session_id,
                peer_party: sender,
                next_send_seq: 1,
                received_messages,
                errors: Vec::new(),
                other_side_errored: false,
                other_side_closed: false,
            },
        );
        checkpoint
            .pending_deduplication_facts
            .push(handler.dedup_id.clone());

        let mut state = MachineState::new(checkpoint);
        state.unacked_handlers.push(handler);

        Self::spawn_flow(inner, state, VecDeque::from([Event::Start]), None)
    }

    /// Apply a scheduler directive produced by the executor.
    fn apply_directive(
        &self,
        id: FlowId,
        directive: Directive,
        outcome_tx: &watch::Sender<Option<FlowOutcome>>,
    ) -> bool {
        match directive {
            Directive::RemoveSessionBindings(session_ids) => {
                let mut bindings = self.bindings.lock();
                for sid in session_ids {
                    bindings.remove(&sid);
                }
                false
            }
            Directive::RemoveFlow { outcome } => {
                tracing::info!(
                    flow_id = %id.short(),
                    outcome = match &outcome {
                        FlowOutcome::OrderlyFinish { .. } => "orderly",
                        FlowOutcome::ErrorFinish { .. } => "errored",
                    },
                    "flow removed"
                );
                self.executor_deps.timers.cancel_all(id);
                self.hospital.discharge(&id);
                // send_replace: the outcome must stick even when nobody
                // has subscribed yet.
                outcome_tx.send_replace(Some(outcome));
                false
            }
            Directive::RetryFromSafePoint => true,
        }
    }
}

struct FlowDriver<C: Clock + 'static> {
    inner: Arc<EngineInner<C>>,
    ctx: TransitionContext,
    flow_ctx: FlowCtx,
    fiber: Box<dyn FlowLogic>,
    state: MachineState,
    executor: ActionExecutor<C>,
    events: mpsc::Receiver<Event>,
    internal: VecDeque<Event>,
    outcome: watch::Sender<Option<FlowOutcome>>,
}

impl<C: Clock + 'static> FlowDriver<C> {
    async fn run(mut self, initial_resume: Option<ResumeValue>) {
        let id = self.ctx.id;
        tracing::debug!(flow_id = %id.short(), "fiber started");

        if let Some(value) = initial_resume {
            self.step_fiber(value);
        }

        let mut restart = false;
        'driver: loop {
            let event = match self.internal.pop_front() {
                Some(event) => event,
                None => match self.events.recv().await {
                    Some(event) => event,
                    None => break,
                },
            };

            tracing::debug!(
                flow_id = %id.short(),
                event = %event.log_summary(),
                "processing event"
            );

            let hospital_error = match &event {
                Event::Error { error } if error.needs_hospital() => Some(error.clone()),
                Event::Error { .. } => None,
                _ => None,
            };
            let user_error = matches!(&event, Event::Error { error } if !error.needs_hospital());

            let result = self
                .inner
                .chain
                .execute_transition(&self.ctx, &self.state, &event);
            self.state = result.state;

            match self.executor.execute_all(result.actions).await {
                Ok(directives) => {
                    for directive in directives {
                        if self.inner.apply_directive(id, directive, &self.outcome) {
                            restart = true;
                        }
                    }
                }
                Err(e) => {
                    self.fault(e);
                    continue;
                }
            }

            // Error policy: user errors propagate right away; internal
            // errors go through the hospital.
            if user_error {
                self.internal.push_back(Event::StartErrorPropagation);
            } else if let Some(error) = hospital_error {
                let command = self
                    .inner
                    .hospital
                    .admit(HospitalReport {
                        flow_id: id,
                        error,
                        admissions: 0,
                    })
                    .await;
                self.internal.push_back(match command {
                    HospitalCommand::RetryFromSafePoint => Event::RetryFromSafePoint,
                    HospitalCommand::StartErrorPropagation => Event::StartErrorPropagation,
                    HospitalCommand::Pause => Event::Pause,
                    HospitalCommand::Kill => Event::Kill,
                });
            }

            if restart {
                break 'driver;
            }

            match result.continuation {
                skein_core::Continuation::Resume { value } => self.step_fiber(value),
                skein_core::Continuation::ProcessEvents => {}
                skein_core::Continuation::Abort => {
                    let lingering = self.state.removed
                        && self
                            .state
                            .checkpoint
                            .checkpoint_state
                            .sessions
                            .values()
                            .any(|s| s.holds_buffered_errors());
                    if !lingering {
                        break 'driver;
                    }
                    tracing::debug!(
                        flow_id = %id.short(),
                        "flow removed but holding sessions open to flush errors"
                    );
                }
            }
        }

        tracing::debug!(flow_id = %id.short(), restart, "fiber stopped");
        if restart {
            let inner = Arc::clone(&self.inner);
            inner.flows.lock().remove(&id);
            // Reload from the last committed checkpoint and run again.
            if let Err(e) = EngineInner::respawn_from_store(&inner, id) {
                tracing::error!(flow_id = %id.short(), error = %e, "retry respawn failed");
            }
        }
    }

    /// An executor fault: the transaction is already rolled back. A stale
    /// checkpoint version means a replayed transition — retry from the
    /// committed state. Anything else is an internal error for the
    /// hospital path.
    fn fault(&mut self, error: ExecuteError) {
        match error {
            ExecuteError::Store(StoreError::StaleCheckpoint { .. }) => {
                self.internal.push_back(Event::RetryFromSafePoint);
            }
            other => {
                self.internal.push_back(Event::Error {
                    error: FlowError::fresh(ErrorCause::Internal {
                        message: other.to_string(),
                    }),
                });
            }
        }
    }

    /// Run one fiber step and queue the resulting events.
    fn step_fiber(&mut self, value: ResumeValue) {
        let yielded = match value {
            ResumeValue::Args { args } => self.fiber.on_start(args, &self.flow_ctx),
            other => {
                let frame = match &self.state.checkpoint.flow_state {
                    FlowState::Started { frame, .. } => frame.clone(),
                    _ => FlowFrame::default(),
                };
                self.fiber.on_resume(frame, other, &self.flow_ctx)
            }
        };

        match yielded {
            FlowYield::Suspend {
                requests,
                reason,
                frame,
            } => {
                let mut rest = Vec::with_capacity(requests.len());
                for request in requests {
                    match request {
                        FlowRequest::Initiate {
                            session_id,
                            destination,
                            flow_name,
                        } => {
                            // Sessions bind as soon as the fiber announces
                            // them, so the confirmation can route back.
                            self.inner.bindings.lock().insert(session_id, self.ctx.id);
                            self.internal.push_back(Event::InitiateSession {
                                session_id,
                                destination,
                                flow_name,
                            });
                        }
                        other => rest.push(other),
                    }
                }
                self.internal.push_back(Event::Suspend {
                    requests: rest,
                    reason,
                    frame,
                });
            }
            FlowYield::Finish { result } => {
                self.internal.push_back(Event::Finished { result });
            }
            FlowYield::Throw { exception } => {
                // A rethrown peer error keeps its correlation id.
                let error_id = exception
                    .original_error_id
                    .unwrap_or_else(skein_core::ErrorId::fresh);
                self.internal.push_back(Event::Error {
                    error: FlowError {
                        error_id,
                        cause: ErrorCause::Exception(exception),
                    },
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
