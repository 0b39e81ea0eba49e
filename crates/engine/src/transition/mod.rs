// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transition layer: a pure function from (state, event) to
//! (state, actions, continuation).
//!
//! This is the only place the machine's rules live. Nothing here performs
//! I/O or reads a clock; identifiers allocated inside are derived from the
//! flow's own counters, so re-running a transition against the same
//! pre-state yields a byte-identical result.

mod builder;
mod errored;
mod started;
mod unstarted;

use skein_core::{
    ErrorCause, ErrorId, Event, FlowError, FlowId, FlowState, MachineState, PartyId, ResumeValue,
    SessionState, SuspendReason, TransitionResult,
};

/// Per-flow facts the transition may read. Carried explicitly — the
/// transition never consults ambient state.
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub id: FlowId,
    /// The node this flow runs on.
    pub party: PartyId,
    /// Whether the flow runs under a flow-level timeout.
    pub timed: bool,
}

/// Apply one event to one flow.
pub fn transition(
    ctx: &TransitionContext,
    state: &MachineState,
    event: &Event,
) -> TransitionResult {
    if state.checkpoint.is_errored() {
        errored::transition(ctx, state, event)
    } else {
        match state.checkpoint.flow_state {
            FlowState::Unstarted { .. } => unstarted::transition(ctx, state, event),
            FlowState::Started { .. } | FlowState::Finished => {
                started::transition(ctx, state, event)
            }
        }
    }
}

/// Check whether a suspended flow's wait is already satisfied by buffered
/// session state, popping the consumed values. Shared by the suspend rule,
/// the message-arrival rules, and crash recovery.
pub fn try_resume(state: &mut MachineState) -> Option<ResumeValue> {
    let reason = match &state.checkpoint.flow_state {
        FlowState::Started { reason, .. } => reason.clone(),
        _ => return None,
    };
    match reason {
        SuspendReason::Yield => Some(ResumeValue::Unit),
        SuspendReason::Receive { sessions } => receive_ready(state, &sessions),
        SuspendReason::SleepUntil { .. } | SuspendReason::AwaitOperation { .. } => None,
    }
}

/// Resolve a receive wait: session errors surface first, then
/// end-of-session, then one data message popped from each awaited session
/// once all have one.
fn receive_ready(
    state: &mut MachineState,
    awaited: &[skein_core::SessionId],
) -> Option<ResumeValue> {
    enum Wait {
        Ended(skein_core::SessionId),
        Rejected(FlowError),
        PeerError(skein_core::SessionId),
    }

    // Pass 1: any awaited session with a surfaceable error ends the wait.
    let mut interrupt = None;
    for sid in awaited {
        match state.checkpoint.checkpoint_state.sessions.get(sid) {
            None => interrupt = Some(Wait::Ended(*sid)),
            Some(SessionState::Initiating {
                rejection_error: Some(error),
                ..
            }) => interrupt = Some(Wait::Rejected((**error).clone())),
            Some(SessionState::Initiated {
                errors,
                received_messages,
                other_side_closed,
                ..
            }) => {
                if !errors.is_empty() {
                    interrupt = Some(Wait::PeerError(*sid));
                } else if *other_side_closed && received_messages.is_empty() {
                    interrupt = Some(Wait::Ended(*sid));
                }
            }
            _ => {}
        }
        if interrupt.is_some() {
            break;
        }
    }
    match interrupt {
        Some(Wait::Rejected(error)) => return Some(ResumeValue::Error { error }),
        Some(Wait::PeerError(sid)) => {
            if let Some(SessionState::Initiated { errors, .. }) =
                state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
            {
                if !errors.is_empty() {
                    return Some(ResumeValue::Error {
                        error: errors.remove(0),
                    });
                }
            }
            return None;
        }
        Some(Wait::Ended(sid)) => {
            let flow_id = state.checkpoint.id;
            let seq = state.checkpoint.next_dedup_seq();
            return Some(ResumeValue::Error {
                error: FlowError {
                    error_id: ErrorId::derived(&flow_id, seq),
                    cause: ErrorCause::SessionEnded { session_id: sid },
                },
            });
        }
        None => {}
    }

    // Pass 2: every awaited session must hold at least one data message.
    if awaited.is_empty() {
        // A receive on no sessions completes immediately.
        return Some(ResumeValue::SessionData { messages: vec![] });
    }
    let all_ready = awaited.iter().all(|sid| {
        matches!(
            state.checkpoint.checkpoint_state.sessions.get(sid),
            Some(SessionState::Initiated {
                received_messages, ..
            }) if !received_messages.is_empty()
        )
    });
    if !all_ready {
        return None;
    }

    let mut messages = Vec::with_capacity(awaited.len());
    for sid in awaited {
        if let Some(SessionState::Initiated {
            received_messages, ..
        }) = state.checkpoint.checkpoint_state.sessions.get_mut(sid)
        {
            let (_seq, body) = received_messages.remove(0);
            messages.push((*sid, body));
        }
    }
    Some(ResumeValue::SessionData { messages })
}

#[cfg(test)]
#[path = "../transition_tests/mod.rs"]
mod tests;
