// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error-flow transition tests

use super::*;
use skein_core::{ErrorCause, ErrorId, FlowException};

fn user_error(message: &str) -> FlowError {
    FlowError::fresh(ErrorCause::Exception(FlowException::new(message)))
}

fn errored(state: MachineState, error: FlowError) -> MachineState {
    let ctx = ctx_for(&state);
    let result = transition(&ctx, &state, &Event::Error { error });
    assert!(matches!(result.continuation, Continuation::ProcessEvents));
    result.state
}

fn propagated_index(state: &MachineState) -> u32 {
    match &state.checkpoint.error_state {
        ErrorState::Errored {
            propagated_index, ..
        } => *propagated_index,
        ErrorState::Clean => panic!("expected errored state"),
    }
}

#[test]
fn error_event_records_without_emitting_actions() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &Event::Error {
            error: user_error("boom"),
        },
    );

    assert!(result.actions.is_empty());
    assert!(result.state.checkpoint.is_errored());
    assert!(matches!(result.continuation, Continuation::ProcessEvents));
}

#[test]
fn propagation_reaches_initiated_sessions_and_finishes_failed() {
    let sid = SessionId::new(1);
    let peer_sid = SessionId::new(2);
    let state = with_initiated_session(started(client_state(None)), sid, peer_sid);
    let error = user_error("boom");
    let state = errored(state, error.clone());
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::StartErrorPropagation);

    let names = action_names(&result);
    assert_eq!(
        names,
        vec![
            "bus:propagate-errors",
            "txn:create",
            "txn:track",
            "checkpoint:remove",
            "locks:release",
            "txn:commit",
            "session:remove-bindings",
            "flow:remove"
        ]
    );
    match result.actions.first() {
        Some(Action::PropagateErrors {
            messages, sessions, ..
        }) => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].error_id, error.error_id);
            // First hop carries the exception body
            assert!(messages[0].exception.is_some());
            assert_eq!(sessions[0].session_id, peer_sid);
        }
        other => panic!("expected error propagation, got {other:?}"),
    }
    assert_eq!(propagated_index(&result.state), 1);
    assert_eq!(
        result.state.checkpoint.status,
        skein_core::CheckpointStatus::Failed
    );
    assert!(result.state.removed);
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn received_errors_are_forwarded_without_their_payload() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    // An error that arrived from a peer: original_error_id is set
    let peer_error = FlowError::from_peer(ErrorId(42), Some(FlowException::new("nope")));
    let state = errored(state, peer_error);
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::StartErrorPropagation);

    match result.actions.first() {
        Some(Action::PropagateErrors { messages, .. }) => {
            assert_eq!(messages[0].error_id, ErrorId(42));
            assert!(messages[0].exception.is_none(), "payload travels one hop only");
        }
        other => panic!("expected error propagation, got {other:?}"),
    }
}

#[test]
fn errors_prepend_to_initiating_session_buffers() {
    let sid = SessionId::new(1);
    let mut state = started(client_state(None));
    let flow = state.checkpoint.id;
    state.checkpoint.checkpoint_state.sessions.insert(
        sid,
        SessionState::Initiating {
            our_session_id: sid,
            destination: PartyId::new("node-b"),
            flow_name: "pong".into(),
            sent: true,
            buffered_messages: vec![(
                DedupId::Message { sender: flow, seq: 1 },
                data(1, json!("pending")),
            )],
            rejection_error: None,
            next_send_seq: 2,
        },
    );
    let state = errored(state, user_error("boom"));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::StartErrorPropagation);

    match result
        .state
        .checkpoint
        .checkpoint_state
        .sessions
        .get(&sid)
    {
        Some(SessionState::Initiating {
            buffered_messages, ..
        }) => {
            assert!(buffered_messages[0].1.is_error(), "error goes ahead of data");
            assert_eq!(buffered_messages.len(), 2);
        }
        other => panic!("expected initiating session, got {other:?}"),
    }
    // Still flushing: the flow is removed but lingers for the confirm
    assert!(result.state.removed);
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn late_confirm_flushes_only_the_errors() {
    let sid = SessionId::new(1);
    let peer_sid = SessionId::new(50);
    let mut state = started(client_state(None));
    let flow = state.checkpoint.id;
    state.checkpoint.checkpoint_state.sessions.insert(
        sid,
        SessionState::Initiating {
            our_session_id: sid,
            destination: PartyId::new("node-b"),
            flow_name: "pong".into(),
            sent: true,
            buffered_messages: vec![(
                DedupId::Message { sender: flow, seq: 1 },
                data(1, json!("pending")),
            )],
            rejection_error: None,
            next_send_seq: 2,
        },
    );
    let state = errored(state, user_error("boom"));
    let ctx = ctx_for(&state);
    let state = transition(&ctx, &state, &Event::StartErrorPropagation).state;

    let result = transition(
        &ctx,
        &state,
        &message(
            sid,
            SessionPayload::Confirm {
                initiated_session_id: peer_sid,
            },
            handler(FlowId::fresh(), 9),
        ),
    );

    let sends = result.actions.iter().find_map(|action| match action {
        Action::SendMultiple { sends } => Some(sends.clone()),
        _ => None,
    });
    let sends = sends.expect("expected the error flush");
    assert_eq!(sends.len(), 1, "no data follows an error on a session");
    assert!(sends[0].payload.is_error());
    assert_eq!(sends[0].recipient_session_id, peer_sid);
    // Nothing left holding the flow open
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn peers_that_already_errored_are_not_re_errored() {
    let sid = SessionId::new(1);
    let mut state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    if let Some(SessionState::Initiated {
        other_side_errored, ..
    }) = state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
    {
        *other_side_errored = true;
    }
    let state = errored(state, user_error("boom"));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::StartErrorPropagation);

    assert!(
        !action_names(&result).contains(&"bus:propagate-errors"),
        "no amplification loops between mutually-erroring flows"
    );
}

#[test]
fn two_errors_propagate_in_one_step() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let state = errored(state, user_error("first"));
    let ctx = ctx_for(&state);
    let state = transition(
        &ctx,
        &state,
        &Event::Error {
            error: user_error("second"),
        },
    )
    .state;

    let result = transition(&ctx, &state, &Event::StartErrorPropagation);

    match result.actions.first() {
        Some(Action::PropagateErrors { messages, .. }) => assert_eq!(messages.len(), 2),
        other => panic!("expected error propagation, got {other:?}"),
    }
    assert_eq!(propagated_index(&result.state), 2);
}

#[test]
fn propagated_index_never_retransmits() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let state = errored(state, user_error("first"));
    let ctx = ctx_for(&state);
    let state = transition(&ctx, &state, &Event::StartErrorPropagation).state;
    assert_eq!(propagated_index(&state), 1);

    // A later error propagates only the delta
    let result = transition(
        &ctx,
        &state,
        &Event::Error {
            error: user_error("late"),
        },
    );

    match result.actions.first() {
        Some(Action::PropagateErrors { messages, .. }) => {
            assert_eq!(messages.len(), 1, "only the unpropagated error is sent");
        }
        other => panic!("expected error propagation, got {other:?}"),
    }
    assert_eq!(propagated_index(&result.state), 2);
}

#[test]
fn errored_client_flow_keeps_its_row_and_records_the_outcome() {
    let state = client_state(Some("c1"));
    let state = started(state);
    let state = errored(state, user_error("boom"));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::StartErrorPropagation);

    let names = action_names(&result);
    assert!(names.contains(&"checkpoint:persist"));
    assert!(!names.contains(&"checkpoint:remove"));
    assert!(names.contains(&"result:record"));
    let persisted = persisted_checkpoint(&result).expect("row kept for the client");
    assert_eq!(persisted.status, skein_core::CheckpointStatus::Failed);
    match result.actions.iter().find_map(|action| match action {
        Action::RecordResult { outcome, .. } => Some(outcome.clone()),
        _ => None,
    }) {
        Some(FlowOutcome::ErrorFinish { errors }) => assert_eq!(errors.len(), 1),
        other => panic!("expected recorded error finish, got {other:?}"),
    }
}

#[test]
fn retry_from_safe_point_rolls_back_and_aborts() {
    let state = started(client_state(None));
    let state = errored(state, FlowError::fresh(ErrorCause::Internal {
        message: "db down".into(),
    }));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::RetryFromSafePoint);

    assert_eq!(
        action_names(&result),
        vec!["txn:rollback", "flow:retry-from-safe-point"]
    );
    assert!(matches!(result.continuation, Continuation::Abort));
    // Retry changes nothing in the machine state itself
    assert_eq!(result.state, state);
}
