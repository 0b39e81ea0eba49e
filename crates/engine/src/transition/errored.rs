// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error-flow transition: every event on an errored flow routes
//! through here. Errors recorded on the checkpoint are transmitted to live
//! peer sessions exactly once, then the flow finishes `Failed`.

use super::builder::TransitionBuilder;
use super::{started, TransitionContext};
use skein_core::{
    Action, Continuation, DedupHandler, DedupId, ErrorCause, ErrorState, ErrorSessionMessage,
    Event, ExistingSend, FlowError, FlowOutcome, FlowState, MachineState, PeerSession, SessionId,
    SessionPayload, SessionState, TransitionResult,
};

pub(super) fn transition(
    ctx: &TransitionContext,
    state: &MachineState,
    event: &Event,
) -> TransitionResult {
    let mut b = TransitionBuilder::new(ctx, state);
    match event {
        Event::StartErrorPropagation => {
            if let ErrorState::Errored { propagating, .. } = &mut b.checkpoint().error_state {
                *propagating = true;
            }
            run_error_flow(b)
        }

        Event::Error { error } => {
            b.checkpoint().push_error(error.clone());
            run_error_flow(b)
        }

        Event::MessageReceived {
            session_id,
            payload,
            handler,
        } => {
            apply_message(&mut b, *session_id, payload, handler);
            run_error_flow(b)
        }

        Event::RetryFromSafePoint | Event::FlowTimeout => started::retry(b),

        Event::Kill => started::kill(b),

        Event::Pause => {
            b.checkpoint().status = skein_core::CheckpointStatus::Paused;
            b.commit_checkpoint();
            b.finish(Continuation::Abort)
        }

        Event::SoftShutdown => b.finish(Continuation::Abort),

        // The fiber is dead and the flow is past user code; these inputs
        // have no effect on an errored machine.
        Event::Start
        | Event::Suspend { .. }
        | Event::InitiateSession { .. }
        | Event::Finished { .. }
        | Event::DeliverSessionEnded { .. }
        | Event::AsyncOpCompleted { .. }
        | Event::SleepFinished => b.finish(Continuation::ProcessEvents),
    }
}

/// Session bookkeeping for messages reaching an errored flow. The
/// interesting case is a confirmation for a session that buffers
/// unpropagated errors: the errors flush now, and only the errors — no
/// data follows an error on a session.
fn apply_message(
    b: &mut TransitionBuilder<'_>,
    sid: SessionId,
    payload: &SessionPayload,
    handler: &DedupHandler,
) {
    if !b.record_inbound(handler) {
        return;
    }
    match payload {
        SessionPayload::Confirm {
            initiated_session_id,
        } => {
            let entry = b.state.checkpoint.checkpoint_state.sessions.get(&sid).cloned();
            let Some(SessionState::Initiating {
                destination,
                buffered_messages,
                rejection_error: None,
                ..
            }) = entry
            else {
                return;
            };
            let sends: Vec<ExistingSend> = buffered_messages
                .into_iter()
                .filter(|(_, payload)| payload.is_error())
                .map(|(dedup_id, payload)| ExistingSend {
                    peer: destination.clone(),
                    recipient_session_id: *initiated_session_id,
                    payload,
                    dedup_id,
                })
                .collect();
            if !sends.is_empty() {
                b.action(Action::SendMultiple { sends });
            }
            b.checkpoint().checkpoint_state.sessions.shift_remove(&sid);
            b.action(Action::RemoveSessionBindings {
                session_ids: vec![sid],
            });
        }

        SessionPayload::Error(message) => {
            let error = FlowError::from_peer(message.error_id, message.exception.clone());
            match b.state.checkpoint.checkpoint_state.sessions.get_mut(&sid) {
                Some(SessionState::Initiated {
                    other_side_errored, ..
                }) => *other_side_errored = true,
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

        SessionPayload::End => started::mark_session_closed(b, sid),

        // Data for a dead flow: the fact is recorded, the body dropped.
        SessionPayload::Data { .. } => {}
    }
}

/// The error-flow proper (runs only once `propagating` is set):
///
/// 1. Derive a wire message for each not-yet-propagated error — exception
///    payload on first hop only.
/// 2. Prepend them to the buffers of initiating sessions without a
///    rejection, so a late-confirming peer errors as soon as it comes up.
/// 3. Emit them to every initiated session whose other side has not
///    itself errored.
/// 4. Finish the flow `Failed` (remove or keep the row by client id) —
///    unless it was already removed and merely lingers to flush buffers.
fn run_error_flow(mut b: TransitionBuilder<'_>) -> TransitionResult {
    let ErrorState::Errored {
        errors,
        propagated_index,
        propagating,
    } = b.state.checkpoint.error_state.clone()
    else {
        return b.finish(Continuation::ProcessEvents);
    };
    if !propagating {
        return b.finish(Continuation::ProcessEvents);
    }

    let remaining = &errors[propagated_index as usize..];
    if !remaining.is_empty() {
        let messages: Vec<ErrorSessionMessage> =
            remaining.iter().map(derive_error_message).collect();

        // Initiating sessions get the errors ahead of any pending data.
        let initiating: Vec<SessionId> = b
            .state
            .checkpoint
            .checkpoint_state
            .sessions
            .iter()
            .filter_map(|(sid, session)| match session {
                SessionState::Initiating {
                    rejection_error: None,
                    ..
                } => Some(*sid),
                _ => None,
            })
            .collect();
        for sid in initiating {
            if let Some(SessionState::Initiating {
                buffered_messages, ..
            }) = b.state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
            {
                let prepends = messages.iter().map(|message| {
                    (
                        DedupId::Error {
                            error_id: message.error_id,
                            source_session: sid,
                        },
                        SessionPayload::Error(message.clone()),
                    )
                });
                buffered_messages.splice(0..0, prepends);
            }
        }

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
                messages,
                sessions: peers,
                sender: b.ctx.id,
            });
        }

        if let ErrorState::Errored {
            propagated_index, ..
        } = &mut b.checkpoint().error_state
        {
            *propagated_index = errors.len() as u32;
        }
    }

    let held_open: Vec<SessionId> = b
        .state
        .checkpoint
        .checkpoint_state
        .sessions
        .iter()
        .filter_map(|(sid, session)| session.holds_buffered_errors().then_some(*sid))
        .collect();

    if !b.state.removed {
        if b.ctx.timed {
            b.action(Action::CancelFlowTimeout { id: b.ctx.id });
        }
        b.checkpoint().status = skein_core::CheckpointStatus::Failed;
        b.checkpoint().flow_state = FlowState::Finished;

        let outcome = FlowOutcome::ErrorFinish { errors };
        let keep_row = b.state.checkpoint.client_id().is_some();
        b.terminal_commit(&outcome, keep_row);

        // Bindings for sessions still flushing errors stay live; the rest
        // are torn down with the flow.
        let removable: Vec<SessionId> = b
            .state
            .checkpoint
            .checkpoint_state
            .sessions
            .keys()
            .filter(|sid| !held_open.contains(sid))
            .copied()
            .collect();
        b.action(Action::RemoveSessionBindings {
            session_ids: removable,
        });
        b.action(Action::RemoveFlow {
            id: b.ctx.id,
            outcome,
        });
        b.state.removed = true;
        b.finish(Continuation::Abort)
    } else {
        // Already removed: record any facts gathered while lingering, so
        // acknowledged messages always have a durable dedup fact.
        b.commit_facts_only();
        if held_open.is_empty() {
            b.finish(Continuation::Abort)
        } else {
            // Still holding sessions open to flush their errors.
            b.finish(Continuation::ProcessEvents)
        }
    }
}

fn derive_error_message(error: &FlowError) -> ErrorSessionMessage {
    let exception = match &error.cause {
        ErrorCause::Exception(exception) if exception.first_hop() => Some(exception.clone()),
        _ => None,
    };
    ErrorSessionMessage {
        error_id: error.error_id,
        exception,
    }
}
