// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action executor
//!
//! Interprets the actions emitted by a transition strictly in order. This
//! is the only component that touches real resources: the stores (through
//! a scoped transaction), the bus, the timers, and the async-op runner.
//! Scheduler-owned actions come back to the fiber driver as directives.

use crate::asyncop::OperationRegistry;
use crate::bus::MessageBus;
use crate::error::ExecuteError;
use crate::timer::{TimerKind, TimerService};
use skein_core::{
    Action, Clock, Event, ExistingSend, FlowId, FlowOutcome, PartyId, SessionId, SessionPayload,
};
use skein_store::{IsolationLevel, SoftLockRegistry, Txn, TxnManager};
use skein_wire::{Envelope, ExistingSessionMessage, InitialSessionMessage, SessionMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Actions the scheduler itself must apply (it owns the fiber arena and
/// the session bindings, not the executor).
#[derive(Debug)]
pub enum Directive {
    RemoveSessionBindings(Vec<SessionId>),
    RemoveFlow { outcome: FlowOutcome },
    RetryFromSafePoint,
}

/// Shared resources the executor runs actions against.
pub struct ExecutorDeps {
    pub txns: Arc<TxnManager>,
    pub locks: Arc<SoftLockRegistry>,
    pub bus: Arc<dyn MessageBus>,
    pub timers: Arc<dyn TimerService>,
    pub operations: OperationRegistry,
}

/// Per-flow action interpreter. Holds the flow's open transaction between
/// the create and commit actions of one list.
pub struct ActionExecutor<C: Clock> {
    flow_id: FlowId,
    party: PartyId,
    app_name: String,
    platform_version: u32,
    flow_timeout_ms: Option<u64>,
    deps: Arc<ExecutorDeps>,
    clock: C,
    event_tx: mpsc::Sender<Event>,
    txn: Option<Txn>,
}

impl<C: Clock> ActionExecutor<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow_id: FlowId,
        party: PartyId,
        app_name: String,
        platform_version: u32,
        flow_timeout_ms: Option<u64>,
        deps: Arc<ExecutorDeps>,
        clock: C,
        event_tx: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            flow_id,
            party,
            app_name,
            platform_version,
            flow_timeout_ms,
            deps,
            clock,
            event_tx,
            txn: None,
        }
    }

    /// Execute a single action with tracing.
    pub async fn execute(&mut self, action: Action) -> Result<Option<Directive>, ExecuteError> {
        // Format the fields as `key=val`
        let info = {
            let fields = action.fields();
            let cap = fields.iter().map(|(a, b)| a.len() + b.len() + 2).sum();
            let mut fmt = String::with_capacity(cap);
            for (key, val) in fields {
                fmt.push_str(key);
                fmt.push('=');
                fmt.push_str(&val);
                fmt.push(' ');
            }
            fmt.pop();
            fmt
        };

        let op = action.name();
        let verbose = action.verbose();
        if verbose {
            tracing::info!(flow_id = %self.flow_id.short(), "executing action={} {}", op, info);
        }

        let start = std::time::Instant::now();
        let result = self.execute_inner(action).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) if verbose => {
                tracing::info!(flow_id = %self.flow_id.short(), elapsed_ms, "completed")
            }
            Ok(_) => tracing::debug!(
                flow_id = %self.flow_id.short(),
                elapsed_ms,
                "executed action={} {}",
                op,
                info
            ),
            Err(e) => tracing::error!(
                flow_id = %self.flow_id.short(),
                error = %e,
                elapsed_ms,
                "failed action={} {}",
                op,
                info
            ),
        }

        result
    }

    async fn execute_inner(&mut self, action: Action) -> Result<Option<Directive>, ExecuteError> {
        match action {
            // === Transaction bracketing ===
            Action::CreateTransaction => {
                if self.txn.is_some() {
                    return Err(ExecuteError::TransactionAlreadyOpen {
                        action: "txn:create",
                    });
                }
                self.txn = Some(TxnManager::begin(&self.deps.txns, IsolationLevel::ReadCommitted));
                Ok(None)
            }

            Action::TrackTransaction { id } => {
                self.open_txn("txn:track")?.track(id);
                Ok(None)
            }

            Action::CommitTransaction => {
                let txn = self.txn.take().ok_or(ExecuteError::NoOpenTransaction {
                    action: "txn:commit",
                })?;
                txn.commit()?;
                Ok(None)
            }

            Action::RollbackTransaction => {
                // Tolerates no open transaction: a retry may arrive while
                // the flow sits between transitions.
                if let Some(txn) = self.txn.take() {
                    txn.rollback();
                }
                Ok(None)
            }

            // === Durable state ===
            Action::PersistCheckpoint { id, checkpoint, .. } => {
                self.open_txn("checkpoint:persist")?
                    .persist_checkpoint(id, &checkpoint)?;
                Ok(None)
            }

            Action::RemoveCheckpoint {
                id,
                may_have_persistent_results,
            } => {
                self.open_txn("checkpoint:remove")?
                    .remove_checkpoint(id, may_have_persistent_results)?;
                Ok(None)
            }

            Action::PersistDeduplicationFacts { facts } => {
                self.open_txn("dedup:persist")?.insert_dedup_facts(facts)?;
                Ok(None)
            }

            Action::RecordResult { client_id, outcome } => {
                self.open_txn("result:record")?
                    .record_result(client_id, outcome)?;
                Ok(None)
            }

            // === Bus ===
            Action::AcknowledgeMessages { handlers } => {
                for handler in &handlers {
                    self.deps.bus.ack(handler);
                }
                Ok(None)
            }

            Action::SendInitial {
                destination,
                initiator_session_id,
                flow_name,
                payload,
                dedup_id,
            } => {
                let envelope = Envelope {
                    sender: self.party.clone(),
                    destination,
                    dedup_id,
                    message: SessionMessage::Initial(InitialSessionMessage {
                        initiator_session_id,
                        flow_name,
                        app_name: self.app_name.clone(),
                        platform_version: self.platform_version,
                        payload,
                    }),
                };
                self.deps.bus.send(envelope).await?;
                Ok(None)
            }

            Action::SendExisting { send } => {
                self.send_existing(send).await?;
                Ok(None)
            }

            Action::SendMultiple { sends } => {
                for send in sends {
                    self.send_existing(send).await?;
                }
                Ok(None)
            }

            Action::PropagateErrors {
                messages,
                sessions,
                sender,
            } => {
                for session in &sessions {
                    for message in &messages {
                        let envelope = Envelope {
                            sender: self.party.clone(),
                            destination: session.party.clone(),
                            dedup_id: skein_core::DedupId::Error {
                                error_id: message.error_id,
                                source_session: session.session_id,
                            },
                            message: SessionMessage::Existing(ExistingSessionMessage {
                                recipient_session_id: session.session_id,
                                payload: SessionPayload::Error(message.clone()),
                            }),
                        };
                        self.deps.bus.send(envelope).await?;
                    }
                }
                tracing::info!(
                    flow_id = %sender.short(),
                    errors = messages.len(),
                    sessions = sessions.len(),
                    "propagated errors to peers"
                );
                Ok(None)
            }

            // === Timers ===
            Action::ScheduleFlowTimeout { id } => {
                if let Some(timeout_ms) = self.flow_timeout_ms {
                    let deadline = self.clock.epoch_ms() + timeout_ms;
                    self.deps.timers.schedule(
                        id,
                        TimerKind::FlowTimeout,
                        deadline,
                        self.event_tx.clone(),
                    );
                }
                Ok(None)
            }

            Action::CancelFlowTimeout { id } => {
                self.deps.timers.cancel(id, TimerKind::FlowTimeout);
                Ok(None)
            }

            Action::SleepUntil { id, until_epoch_ms } => {
                self.deps
                    .timers
                    .schedule(id, TimerKind::Sleep, until_epoch_ms, self.event_tx.clone());
                Ok(None)
            }

            // === Collaborators ===
            Action::ExecuteAsyncOperation {
                id,
                op_seq,
                operation,
            } => {
                self.deps
                    .operations
                    .submit(id, op_seq, operation, self.event_tx.clone());
                Ok(None)
            }

            Action::ReleaseSoftLocks { id } => {
                let released = self.deps.locks.release_all(&id);
                if released > 0 {
                    tracing::debug!(flow_id = %id.short(), released, "released soft locks");
                }
                Ok(None)
            }

            // === Scheduler directives ===
            Action::RetryFlowFromSafePoint { .. } => Ok(Some(Directive::RetryFromSafePoint)),

            Action::RemoveSessionBindings { session_ids } => {
                Ok(Some(Directive::RemoveSessionBindings(session_ids)))
            }

            Action::RemoveFlow { outcome, .. } => Ok(Some(Directive::RemoveFlow { outcome })),
        }
    }

    fn open_txn(&mut self, action: &'static str) -> Result<&mut Txn, ExecuteError> {
        self.txn
            .as_mut()
            .ok_or(ExecuteError::NoOpenTransaction { action })
    }

    async fn send_existing(&self, send: ExistingSend) -> Result<(), ExecuteError> {
        let envelope = Envelope {
            sender: self.party.clone(),
            destination: send.peer,
            dedup_id: send.dedup_id,
            message: SessionMessage::Existing(ExistingSessionMessage {
                recipient_session_id: send.recipient_session_id,
                payload: send.payload,
            }),
        };
        self.deps.bus.send(envelope).await?;
        Ok(())
    }

    /// Execute a transition's actions strictly in order. A fault rolls
    /// back any open transaction and surfaces to the driver, which parks
    /// the flow for the hospital.
    pub async fn execute_all(
        &mut self,
        actions: Vec<Action>,
    ) -> Result<Vec<Directive>, ExecuteError> {
        let mut directives = Vec::new();
        for action in actions {
            match self.execute(action).await {
                Ok(Some(directive)) => directives.push(directive),
                Ok(None) => {}
                Err(e) => {
                    if let Some(txn) = self.txn.take() {
                        txn.rollback();
                    }
                    return Err(e);
                }
            }
        }
        Ok(directives)
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
