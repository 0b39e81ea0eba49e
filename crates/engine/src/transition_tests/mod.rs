// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transition function tests. Everything here drives the pure function
//! directly: no executor, no I/O, no clock.

mod errors;
mod lifecycle;
mod messages;
mod purity;
mod start;
mod suspend;

use super::*;
use serde_json::json;
use skein_core::test_support::{client_invocation, peer_invocation};
use skein_core::{
    Action, Checkpoint, Continuation, DedupHandler, DedupId, ErrorState, Event, FlowError,
    FlowFrame, FlowId, FlowOutcome, FlowRequest, MachineState, PartyId, ResumeValue, SessionId,
    SessionPayload, SessionState, SuspendReason, TransitionResult,
};

fn ctx_for(state: &MachineState) -> TransitionContext {
    TransitionContext {
        id: state.checkpoint.id,
        party: PartyId::new("node-a"),
        timed: false,
    }
}

/// Fresh unstarted client flow.
fn client_state(client_id: Option<&str>) -> MachineState {
    let id = FlowId::fresh();
    let mut invocation = client_invocation("ping", client_id);
    invocation.args = json!({"to": "node-b"});
    MachineState::new(Checkpoint::unstarted(id, invocation))
}

/// Fresh unstarted responder flow with the swapped-token session the
/// scheduler installs at creation.
fn responder_state(initiator_session: SessionId, our_session: SessionId) -> MachineState {
    let id = FlowId::fresh();
    let mut checkpoint =
        Checkpoint::unstarted(id, peer_invocation("pong", "node-b", initiator_session));
    checkpoint.checkpoint_state.sessions.insert(
        our_session,
        SessionState::Initiated {
            our_session_id: our_session,
            peer_session_id: initiator_session,
            peer_party: PartyId::new("node-b"),
            next_send_seq: 1,
            received_messages: vec![],
            errors: vec![],
            other_side_errored: false,
            other_side_closed: false,
        },
    );
    MachineState::new(checkpoint)
}

/// Run the start transition and return the post-state.
fn started(state: MachineState) -> MachineState {
    let ctx = ctx_for(&state);
    let result = transition(&ctx, &state, &Event::Start);
    assert!(matches!(
        result.continuation,
        Continuation::Resume {
            value: ResumeValue::Args { .. }
        }
    ));
    result.state
}

/// Install an initiated session directly.
fn with_initiated_session(mut state: MachineState, sid: SessionId, peer_sid: SessionId) -> MachineState {
    state.checkpoint.checkpoint_state.sessions.insert(
        sid,
        SessionState::Initiated {
            our_session_id: sid,
            peer_session_id: peer_sid,
            peer_party: PartyId::new("node-b"),
            next_send_seq: 1,
            received_messages: vec![],
            errors: vec![],
            other_side_errored: false,
            other_side_closed: false,
        },
    );
    state
}

/// Suspend awaiting data on the given sessions.
fn awaiting(state: MachineState, sessions: Vec<SessionId>) -> MachineState {
    let ctx = ctx_for(&state);
    let result = transition(
        &ctx,
        &state,
        &suspend_event(vec![], SuspendReason::Receive { sessions }),
    );
    result.state
}

fn suspend_event(requests: Vec<FlowRequest>, reason: SuspendReason) -> Event {
    Event::Suspend {
        requests,
        reason,
        frame: FlowFrame::from_value(json!({"step": 1})),
    }
}

fn message(sid: SessionId, payload: SessionPayload, handler: DedupHandler) -> Event {
    Event::MessageReceived {
        session_id: sid,
        payload,
        handler,
    }
}

fn handler(sender: FlowId, seq: u64) -> DedupHandler {
    DedupHandler::new(DedupId::Message { sender, seq }, seq)
}

fn data(seq: u64, body: serde_json::Value) -> SessionPayload {
    SessionPayload::Data { seq, body }
}

fn action_names(result: &TransitionResult) -> Vec<&'static str> {
    result.actions.iter().map(|a| a.name()).collect()
}

/// The persisted snapshot inside a result's actions, if any.
fn persisted_checkpoint(result: &TransitionResult) -> Option<&Checkpoint> {
    result.actions.iter().find_map(|action| match action {
        Action::PersistCheckpoint { checkpoint, .. } => Some(checkpoint.as_ref()),
        _ => None,
    })
}
