// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transitions for started, clean (non-errored) flows.

use super::builder::TransitionBuilder;
use super::{try_resume, TransitionContext};
use skein_core::{
    Action, Continuation, DedupHandler, ErrorCause, ErrorId, ErrorSessionMessage, Event,
    ExistingSend, FlowError, FlowOutcome, FlowRequest, FlowState, MachineState, OpOutcome,
    PeerSession, ResumeValue, SessionId, SessionPayload, SessionState, SuspendReason,
    TransitionResult,
};

pub(super) fn transition(
    ctx: &TransitionContext,
    state: &MachineState,
    event: &Event,
) -> TransitionResult {
    let mut b = TransitionBuilder::new(ctx, state);
    match event {
        // Replayed start on an already-started flow: nothing to do.
        Event::Start => b.finish(Continuation::ProcessEvents),

        Event::InitiateSession {
            session_id,
            destination,
            flow_name,
        } => {
            b.checkpoint().checkpoint_state.sessions.insert(
                *session_id,
                SessionState::Uninitiated {
                    destination: destination.clone(),
                    flow_name: flow_name.clone(),
                },
            );
            b.finish(Continuation::ProcessEvents)
        }

        Event::Suspend {
            requests,
            reason,
            frame,
        } => suspend(b, requests, reason, frame),

        Event::MessageReceived {
            session_id,
            payload,
            handler,
        } => {
            apply_message(&mut b, *session_id, payload, handler);
            // Only a receive wait can be satisfied by an arrival; any
            // other suspension keeps buffering.
            if receiving(&b) {
                resume_or_park(b)
            } else {
                b.finish(Continuation::ProcessEvents)
            }
        }

        Event::DeliverSessionEnded { session_id } => {
            mark_session_closed(&mut b, *session_id);
            if receiving(&b) {
                resume_or_park(b)
            } else {
                b.finish(Continuation::ProcessEvents)
            }
        }

        Event::AsyncOpCompleted { op_seq, outcome } => {
            let awaited = match &b.state.checkpoint.flow_state {
                FlowState::Started {
                    reason: SuspendReason::AwaitOperation { op_seq: expected, .. },
                    ..
                } => Some(*expected),
                _ => None,
            };
            if awaited != Some(*op_seq) {
                // Stale completion from a superseded attempt.
                return b.finish(Continuation::ProcessEvents);
            }
            let value = match outcome {
                OpOutcome::Completed { result } => ResumeValue::Operation {
                    result: result.clone(),
                },
                OpOutcome::Failed { exception } => {
                    let flow_id = b.ctx.id;
                    let seq = b.checkpoint().next_dedup_seq();
                    ResumeValue::Error {
                        error: FlowError {
                            error_id: ErrorId::derived(&flow_id, seq),
                            cause: ErrorCause::Exception(exception.clone()),
                        },
                    }
                }
            };
            b.finish(Continuation::Resume { value })
        }

        Event::SleepFinished => {
            let sleeping = matches!(
                &b.state.checkpoint.flow_state,
                FlowState::Started {
                    reason: SuspendReason::SleepUntil { .. },
                    ..
                }
            );
            if sleeping {
                b.finish(Continuation::Resume {
                    value: ResumeValue::Unit,
                })
            } else {
                b.finish(Continuation::ProcessEvents)
            }
        }

        Event::Finished { result } => finish_flow(b, result.clone()),

        Event::Error { error } => {
            b.checkpoint().push_error(error.clone());
            b.finish(Continuation::ProcessEvents)
        }

        // Nothing recorded yet, so nothing to propagate.
        Event::StartErrorPropagation => b.finish(Continuation::ProcessEvents),

        Event::RetryFromSafePoint | Event::FlowTimeout => retry(b),

        Event::SoftShutdown => b.finish(Continuation::Abort),

        Event::Pause => pause(b),

        Event::Kill => kill(b),
    }
}

/// The fiber suspended: apply its session requests, freeze the frame,
/// commit, and resume immediately if the wait is already satisfied.
fn suspend(
    mut b: TransitionBuilder<'_>,
    requests: &[FlowRequest],
    reason: &SuspendReason,
    frame: &skein_core::FlowFrame,
) -> TransitionResult {
    // A send touching a session that already carries an error surfaces
    // that error instead of suspending; nothing is committed.
    for request in requests {
        if let FlowRequest::Send { session_id, .. } = request {
            if let Some(value) = pending_send_error(&mut b, *session_id) {
                return b.finish(Continuation::Resume { value });
            }
        }
    }

    for request in requests {
        match request {
            FlowRequest::Initiate {
                session_id,
                destination,
                flow_name,
            } => {
                b.checkpoint().checkpoint_state.sessions.insert(
                    *session_id,
                    SessionState::Uninitiated {
                        destination: destination.clone(),
                        flow_name: flow_name.clone(),
                    },
                );
            }
            FlowRequest::Send { session_id, body } => apply_send(&mut b, *session_id, body.clone()),
            FlowRequest::Close { session_id } => apply_close(&mut b, *session_id),
        }
    }

    // A receive on a session nothing was sent on yet still has to open it.
    if let SuspendReason::Receive { sessions } = reason {
        for sid in sessions {
            open_if_uninitiated(&mut b, *sid);
        }
    }

    let reason = match reason {
        SuspendReason::AwaitOperation { operation, .. } => {
            let op_seq = b.checkpoint().next_op_seq();
            b.action(Action::ExecuteAsyncOperation {
                id: b.ctx.id,
                op_seq,
                operation: operation.clone(),
            });
            SuspendReason::AwaitOperation {
                op_seq,
                operation: operation.clone(),
            }
        }
        SuspendReason::SleepUntil { until_epoch_ms } => {
            b.action(Action::SleepUntil {
                id: b.ctx.id,
                until_epoch_ms: *until_epoch_ms,
            });
            SuspendReason::SleepUntil {
                until_epoch_ms: *until_epoch_ms,
            }
        }
        other => other.clone(),
    };

    b.checkpoint().flow_state = FlowState::Started {
        reason,
        frame: frame.clone(),
    };
    b.commit_checkpoint();

    // The persisted checkpoint keeps buffered messages intact; consuming
    // them happens in memory so a crash-and-replay pops them again.
    resume_or_park(b)
}

fn resume_or_park(mut b: TransitionBuilder<'_>) -> TransitionResult {
    match try_resume(&mut b.state) {
        Some(value) => b.finish(Continuation::Resume { value }),
        None => b.finish(Continuation::ProcessEvents),
    }
}

fn receiving(b: &TransitionBuilder<'_>) -> bool {
    matches!(
        &b.state.checkpoint.flow_state,
        FlowState::Started {
            reason: SuspendReason::Receive { .. },
            ..
        }
    )
}

/// Error a send would run into on this session, if any.
fn pending_send_error(b: &mut TransitionBuilder<'_>, sid: SessionId) -> Option<ResumeValue> {
    enum Hit {
        Ended,
        Rejected(FlowError),
        PopError,
    }

    let hit = match b.state.checkpoint.checkpoint_state.sessions.get(&sid) {
        None => Some(Hit::Ended),
        Some(SessionState::Initiating {
            rejection_error: Some(error),
            ..
        }) => Some(Hit::Rejected((**error).clone())),
        Some(SessionState::Initiated {
            errors,
            other_side_closed,
            ..
        }) => {
            if !errors.is_empty() {
                Some(Hit::PopError)
            } else if *other_side_closed {
                Some(Hit::Ended)
            } else {
                None
            }
        }
        _ => None,
    };

    match hit? {
        Hit::Rejected(error) => Some(ResumeValue::Error { error }),
        Hit::PopError => {
            if let Some(SessionState::Initiated { errors, .. }) =
                b.state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
            {
                if !errors.is_empty() {
                    return Some(ResumeValue::Error {
                        error: errors.remove(0),
                    });
                }
            }
            None
        }
        Hit::Ended => {
            let flow_id = b.ctx.id;
            let seq = b.checkpoint().next_dedup_seq();
            Some(ResumeValue::Error {
                error: FlowError {
                    error_id: ErrorId::derived(&flow_id, seq),
                    cause: ErrorCause::SessionEnded { session_id: sid },
                },
            })
        }
    }
}

fn apply_send(b: &mut TransitionBuilder<'_>, sid: SessionId, body: serde_json::Value) {
    let entry = b.state.checkpoint.checkpoint_state.sessions.get(&sid).cloned();
    match entry {
        Some(SessionState::Uninitiated {
            destination,
            flow_name,
        }) => {
            let dedup_id = b.allocate_send_dedup();
            b.checkpoint().checkpoint_state.sessions.insert(
                sid,
                SessionState::Initiating {
                    our_session_id: sid,
                    destination: destination.clone(),
                    flow_name: flow_name.clone(),
                    sent: true,
                    buffered_messages: Vec::new(),
                    rejection_error: None,
                    // The initial message carries the first data payload.
                    next_send_seq: 2,
                },
            );
            b.action(Action::SendInitial {
                destination,
                initiator_session_id: sid,
                flow_name,
                payload: Some(body),
                dedup_id,
            });
        }
        Some(SessionState::Initiating {
            mut buffered_messages,
            destination,
            flow_name,
            sent,
            rejection_error,
            next_send_seq,
            ..
        }) => {
            let dedup_id = b.allocate_send_dedup();
            buffered_messages.push((
                dedup_id,
                SessionPayload::Data {
                    seq: next_send_seq,
                    body,
                },
            ));
            b.checkpoint().checkpoint_state.sessions.insert(
                sid,
                SessionState::Initiating {
                    our_session_id: sid,
                    destination,
                    flow_name,
                    sent,
                    buffered_messages,
                    rejection_error,
                    next_send_seq: next_send_seq + 1,
                },
            );
        }
        Some(SessionState::Initiated {
            our_session_id,
            peer_session_id,
            peer_party,
            next_send_seq,
            received_messages,
            errors,
            other_side_errored,
            other_side_closed,
        }) => {
            let dedup_id = b.allocate_send_dedup();
            b.action(Action::SendExisting {
                send: ExistingSend {
                    peer: peer_party.clone(),
                    recipient_session_id: peer_session_id,
                    payload: SessionPayload::Data {
                        seq: next_send_seq,
                        body,
                    },
                    dedup_id,
                },
            });
            b.checkpoint().checkpoint_state.sessions.insert(
                sid,
                SessionState::Initiated {
                    our_session_id,
                    peer_session_id,
                    peer_party,
                    next_send_seq: next_send_seq + 1,
                    received_messages,
                    errors,
                    other_side_errored,
                    other_side_closed,
                },
            );
        }
        // Closed or never-registered sessions are caught by the pre-scan.
        None => {}
    }
}

fn apply_close(b: &mut TransitionBuilder<'_>, sid: SessionId) {
    let entry = b.state.checkpoint.checkpoint_state.sessions.get(&sid).cloned();
    if let Some(SessionState::Initiated {
        peer_session_id,
        peer_party,
        other_side_errored,
        ..
    }) = &entry
    {
        if !other_side_errored {
            let dedup_id = b.allocate_send_dedup();
            b.action(Action::SendExisting {
                send: ExistingSend {
                    peer: peer_party.clone(),
                    recipient_session_id: *peer_session_id,
                    payload: SessionPayload::End,
                    dedup_id,
                },
            });
        }
    }
    if entry.is_some() {
        b.checkpoint().checkpoint_state.sessions.shift_remove(&sid);
        b.action(Action::RemoveSessionBindings {
            session_ids: vec![sid],
        });
    }
}

/// A receive on an uninitiated session sends the initiating message with
/// no payload, so the peer can come up and start talking.
fn open_if_uninitiated(b: &mut TransitionBuilder<'_>, sid: SessionId) {
    let entry = b.state.checkpoint.checkpoint_state.sessions.get(&sid).cloned();
    if let Some(SessionState::Uninitiated {
        destination,
        flow_name,
    }) = entry
    {
        let dedup_id = b.allocate_send_dedup();
        b.checkpoint().checkpoint_state.sessions.insert(
            sid,
            SessionState::Initiating {
                our_session_id: sid,
                destination: destination.clone(),
                flow_name: flow_name.clone(),
                sent: true,
                buffered_messages: Vec::new(),
                rejection_error: None,
                next_send_seq: 1,
            },
        );
        b.action(Action::SendInitial {
            destination,
            initiator_session_id: sid,
            flow_name,
            payload: None,
            dedup_id,
        });
    }
}

/// Classify and apply one inbound session message. Shared with the
/// unstarted phase (messages may land before `Start` runs).
pub(super) fn apply_message(
    b: &mut TransitionBuilder<'_>,
    sid: SessionId,
    payload: &SessionPayload,
    handler: &DedupHandler,
) {
    if !b.record_inbound(handler) {
        // Same delivery twice inside one uncommitted window.
        return;
    }
    match payload {
        SessionPayload::Confirm {
            initiated_session_id,
        } => confirm_session(b, sid, *initiated_session_id),

        SessionPayload::Data { seq, body } => {
            if let Some(SessionState::Initiated {
                received_messages, ..
            }) = b.state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
            {
                received_messages.push((*seq, body.clone()));
            }
        }

        SessionPayload::Error(message) => apply_peer_error(b, sid, message),

        SessionPayload::End => mark_session_closed(b, sid),
    }
}

/// Upgrade `Initiating → Initiated` and flush the buffered sends in order.
fn confirm_session(b: &mut TransitionBuilder<'_>, sid: SessionId, peer_session_id: SessionId) {
    let entry = b.state.checkpoint.checkpoint_state.sessions.get(&sid).cloned();
    let Some(SessionState::Initiating {
        destination,
        buffered_messages,
        next_send_seq,
        ..
    }) = entry
    else {
        // Duplicate confirmation replay; the session already upgraded.
        return;
    };

    let sends: Vec<ExistingSend> = buffered_messages
        .into_iter()
        .map(|(dedup_id, payload)| ExistingSend {
            peer: destination.clone(),
            recipient_session_id: peer_session_id,
            payload,
            dedup_id,
        })
        .collect();
    if !sends.is_empty() {
        b.action(Action::SendMultiple { sends });
    }

    b.checkpoint().checkpoint_state.sessions.insert(
        sid,
        SessionState::Initiated {
            our_session_id: sid,
            peer_session_id,
            peer_party: destination,
            next_send_seq,
            received_messages: Vec::new(),
            errors: Vec::new(),
            other_side_errored: false,
            other_side_closed: false,
        },
    );
}

fn apply_peer_error(b: &mut TransitionBuilder<'_>, sid: SessionId, message: &ErrorSessionMessage) {
    let error = FlowError::from_peer(message.error_id, message.exception.clone());
    match b.state.checkpoint.checkpoint_state.sessions.get_mut(&sid) {
        Some(SessionState::Initiated {
            errors,
            other_side_errored,
            ..
        }) => {
            *other_side_errored = true;
            errors.push(error);
        }
        Some(SessionState::Initiating {
            rejection_error, ..
        }) => {
            if rejection_error.is_none() {
                *rejection_error = Some(Box::new(error));
            }
        }
        _ => {}
    }
}

pub(super) fn mark_session_closed(b: &mut TransitionBuilder<'_>, sid: SessionId) {
    let needs_rejection = matches!(
        b.state.checkpoint.checkpoint_state.sessions.get(&sid),
        Some(SessionState::Initiating {
            rejection_error: None,
            ..
        })
    );
    if needs_rejection {
        let flow_id = b.ctx.id;
        let seq = b.checkpoint().next_dedup_seq();
        if let Some(SessionState::Initiating {
            rejection_error, ..
        }) = b.state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
        {
            *rejection_error = Some(Box::new(FlowError {
                error_id: ErrorId::derived(&flow_id, seq),
                cause: ErrorCause::SessionEnded { session_id: sid },
            }));
        }
        return;
    }
    if let Some(SessionState::Initiated {
        other_side_closed, ..
    }) = b.state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
    {
        *other_side_closed = true;
    }
}

/// Orderly completion: close every live session, commit terminally, and
/// hand the scheduler its removal.
fn finish_flow(mut b: TransitionBuilder<'_>, result: serde_json::Value) -> TransitionResult {
    let ends: Vec<(SessionId, skein_core::PartyId)> = b
        .state
        .checkpoint
        .checkpoint_state
        .sessions
        .values()
        .filter_map(|session| match session {
            SessionState::Initiated {
                peer_session_id,
                peer_party,
                other_side_errored: false,
                ..
            } => Some((*peer_session_id, peer_party.clone())),
            _ => None,
        })
        .collect();
    let sends: Vec<ExistingSend> = ends
        .into_iter()
        .map(|(peer_session_id, peer)| {
            let dedup_id = b.allocate_send_dedup();
            ExistingSend {
                peer,
                recipient_session_id: peer_session_id,
                payload: SessionPayload::End,
                dedup_id,
            }
        })
        .collect();
    if !sends.is_empty() {
        b.action(Action::SendMultiple { sends });
    }
    if b.ctx.timed {
        b.action(Action::CancelFlowTimeout { id: b.ctx.id });
    }

    b.checkpoint().flow_state = FlowState::Finished;
    b.checkpoint().status = skein_core::CheckpointStatus::Completed;

    let outcome = FlowOutcome::OrderlyFinish { result };
    let keep_row = b.state.checkpoint.client_id().is_some();
    b.terminal_commit(&outcome, keep_row);

    let session_ids: Vec<SessionId> = b
        .state
        .checkpoint
        .checkpoint_state
        .sessions
        .keys()
        .copied()
        .collect();
    b.action(Action::RemoveSessionBindings { session_ids });
    b.action(Action::RemoveFlow {
        id: b.ctx.id,
        outcome,
    });
    b.state.removed = true;
    b.finish(Continuation::Abort)
}

pub(super) fn retry(mut b: TransitionBuilder<'_>) -> TransitionResult {
    b.action(Action::RollbackTransaction);
    b.action(Action::RetryFlowFromSafePoint { id: b.ctx.id });
    b.finish(Continuation::Abort)
}

fn pause(mut b: TransitionBuilder<'_>) -> TransitionResult {
    b.checkpoint().status = skein_core::CheckpointStatus::Paused;
    b.commit_checkpoint();
    b.finish(Continuation::Abort)
}

/// Immediate removal with compensating actions: peers get an error, the
/// row goes away, results survive when a client may come back for them.
pub(super) fn kill(mut b: TransitionBuilder<'_>) -> TransitionResult {
    let flow_id = b.ctx.id;
    let seq = b.checkpoint().next_dedup_seq();
    let error = FlowError {
        error_id: ErrorId::derived(&flow_id, seq),
        cause: ErrorCause::Killed,
    };

    let peers: Vec<PeerSession> = b
        .state
        .checkpoint
        .checkpoint_state
        .sessions
        .values()
        .filter_map(|session| match session {
            SessionState::Initiated {
                peer_session_id,
                peer_party,
                other_side_errored: false,
                ..
            } => Some(PeerSession {
                session_id: *peer_session_id,
                party: peer_party.clone(),
            }),
            _ => None,
        })
        .collect();
    if !peers.is_empty() {
        b.action(Action::PropagateErrors {
            messages: vec![ErrorSessionMessage {
                error_id: error.error_id,
                exception: None,
            }],
            sessions: peers,
            sender: flow_id,
        });
    }
    if b.ctx.timed {
        b.action(Action::CancelFlowTimeout { id: flow_id });
    }

    b.checkpoint().push_error(error);
    b.checkpoint().status = skein_core::CheckpointStatus::Killed;
    b.checkpoint().flow_state = FlowState::Finished;

    let outcome = FlowOutcome::ErrorFinish {
        errors: b.state.checkpoint.error_state.errors().to_vec(),
    };
    b.terminal_commit(&outcome, false);

    let session_ids: Vec<SessionId> = b
        .state
        .checkpoint
        .checkpoint_state
        .sessions
        .keys()
        .copied()
        .collect();
    b.action(Action::RemoveSessionBindings { session_ids });
    b.action(Action::RemoveFlow {
        id: flow_id,
        outcome,
    });
    b.state.removed = true;
    b.finish(Continuation::Abort)
}
