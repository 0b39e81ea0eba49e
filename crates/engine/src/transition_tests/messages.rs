// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use skein_core::{ErrorCause, ErrorId, ErrorSessionMessage, FlowException};

fn initiating_with_buffer(
    state: &mut MachineState,
    sid: SessionId,
    buffered: Vec<(DedupId, SessionPayload)>,
) {
    state.checkpoint.checkpoint_state.sessions.insert(
        sid,
        SessionState::Initiating {
            our_session_id: sid,
            destination: PartyId::new("node-b"),
            flow_name: "pong".into(),
            sent: true,
            buffered_messages: buffered,
            rejection_error: None,
            next_send_seq: 3,
        },
    );
}

#[test]
fn confirm_upgrades_and_flushes_buffered_sends_in_order() {
    let sid = SessionId::new(1);
    let peer_sid = SessionId::new(99);
    let mut state = started(client_state(None));
    let flow = state.checkpoint.id;
    initiating_with_buffer(
        &mut state,
        sid,
        vec![
            (DedupId::Message { sender: flow, seq: 1 }, data(1, json!("a"))),
            (DedupId::Message { sender: flow, seq: 2 }, data(2, json!("b"))),
        ],
    );
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &message(
            sid,
            SessionPayload::Confirm {
                initiated_session_id: peer_sid,
            },
            handler(FlowId::fresh(), 7),
        ),
    );

    let sends = result.actions.iter().find_map(|action| match action {
        Action::SendMultiple { sends } => Some(sends.clone()),
        _ => None,
    });
    let sends = sends.expect("expected the buffer to flush");
    assert_eq!(sends.len(), 2);
    assert!(sends.iter().all(|s| s.recipient_session_id == peer_sid));
    assert_eq!(sends[0].payload, data(1, json!("a")));
    assert_eq!(sends[1].payload, data(2, json!("b")));
    // Replay resends carry the dedup ids recorded at buffering time
    assert_eq!(sends[0].dedup_id, DedupId::Message { sender: flow, seq: 1 });

    match state_session(&result.state, sid) {
        SessionState::Initiated {
            peer_session_id,
            next_send_seq,
            ..
        } => {
            assert_eq!(peer_session_id, peer_sid);
            assert_eq!(next_send_seq, 3);
        }
        other => panic!("expected initiated session, got {other:?}"),
    }
}

fn state_session(state: &MachineState, sid: SessionId) -> SessionState {
    state
        .checkpoint
        .checkpoint_state
        .sessions
        .get(&sid)
        .cloned()
        .expect("session missing")
}

#[test]
fn duplicate_confirm_is_tolerated() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(99));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &message(
            sid,
            SessionPayload::Confirm {
                initiated_session_id: SessionId::new(99),
            },
            handler(FlowId::fresh(), 8),
        ),
    );

    // Fact recorded, session untouched, no sends
    assert!(result.actions.is_empty());
    assert_eq!(result.state.checkpoint.pending_deduplication_facts.len(), 1);
    assert_eq!(state_session(&result.state, sid), state_session(&state, sid));
}

#[test]
fn data_buffers_when_the_flow_is_not_awaiting() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &message(sid, data(1, json!("Y")), handler(FlowId::fresh(), 1)),
    );

    assert!(result.actions.is_empty());
    assert!(matches!(result.continuation, Continuation::ProcessEvents));
    match state_session(&result.state, sid) {
        SessionState::Initiated {
            received_messages, ..
        } => assert_eq!(received_messages, vec![(1, json!("Y"))]),
        other => panic!("expected initiated session, got {other:?}"),
    }
}

#[test]
fn data_resumes_an_awaiting_flow_without_committing() {
    let sid = SessionId::new(1);
    let state = awaiting(
        with_initiated_session(started(client_state(None)), sid, SessionId::new(2)),
        vec![sid],
    );
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &message(sid, data(1, json!("Y")), handler(FlowId::fresh(), 1)),
    );

    // No persistence on the resume path: the dedup fact rides with the
    // next suspension's commit.
    assert!(result.actions.is_empty());
    match &result.continuation {
        Continuation::Resume {
            value: ResumeValue::SessionData { messages },
        } => assert_eq!(messages, &vec![(sid, json!("Y"))]),
        other => panic!("expected data resume, got {other:?}"),
    }
    assert_eq!(result.state.checkpoint.pending_deduplication_facts.len(), 1);
}

#[test]
fn receive_from_two_sessions_waits_for_both() {
    let a = SessionId::new(1);
    let b = SessionId::new(2);
    let state = with_initiated_session(
        with_initiated_session(started(client_state(None)), a, SessionId::new(11)),
        b,
        SessionId::new(12),
    );
    let state = awaiting(state, vec![a, b]);
    let ctx = ctx_for(&state);

    // First arrival: still waiting
    let result = transition(
        &ctx,
        &state,
        &message(a, data(1, json!("from-a")), handler(FlowId::fresh(), 1)),
    );
    assert!(matches!(result.continuation, Continuation::ProcessEvents));

    // Second arrival: one message popped from each, in awaited order
    let result = transition(
        &ctx,
        &result.state,
        &message(b, data(1, json!("from-b")), handler(FlowId::fresh(), 1)),
    );
    match &result.continuation {
        Continuation::Resume {
            value: ResumeValue::SessionData { messages },
        } => {
            assert_eq!(
                messages,
                &vec![(a, json!("from-a")), (b, json!("from-b"))]
            );
        }
        other => panic!("expected data resume, got {other:?}"),
    }
}

#[test]
fn error_message_resumes_an_awaiting_flow() {
    let sid = SessionId::new(1);
    let state = awaiting(
        with_initiated_session(started(client_state(None)), sid, SessionId::new(2)),
        vec![sid],
    );
    let ctx = ctx_for(&state);

    let error_id = ErrorId(77);
    let result = transition(
        &ctx,
        &state,
        &message(
            sid,
            SessionPayload::Error(ErrorSessionMessage {
                error_id,
                exception: Some(FlowException::new("nope")),
            }),
            handler(FlowId::fresh(), 1),
        ),
    );

    match &result.continuation {
        Continuation::Resume {
            value: ResumeValue::Error { error },
        } => {
            assert_eq!(error.error_id, error_id);
            match &error.cause {
                ErrorCause::Exception(exception) => {
                    assert_eq!(exception.message, "nope");
                    assert_eq!(exception.original_error_id, Some(error_id));
                }
                other => panic!("expected exception cause, got {other:?}"),
            }
        }
        other => panic!("expected error resume, got {other:?}"),
    }
    match state_session(&result.state, sid) {
        SessionState::Initiated {
            other_side_errored, ..
        } => assert!(other_side_errored),
        other => panic!("expected initiated session, got {other:?}"),
    }
}

#[test]
fn error_message_queues_when_not_awaiting() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &message(
            sid,
            SessionPayload::Error(ErrorSessionMessage {
                error_id: ErrorId(5),
                exception: None,
            }),
            handler(FlowId::fresh(), 1),
        ),
    );

    assert!(matches!(result.continuation, Continuation::ProcessEvents));
    match state_session(&result.state, sid) {
        SessionState::Initiated {
            errors,
            other_side_errored,
            ..
        } => {
            assert!(other_side_errored);
            assert_eq!(errors.len(), 1);
        }
        other => panic!("expected initiated session, got {other:?}"),
    }
}

#[test]
fn end_message_resumes_with_session_ended() {
    let sid = SessionId::new(1);
    let state = awaiting(
        with_initiated_session(started(client_state(None)), sid, SessionId::new(2)),
        vec![sid],
    );
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &message(sid, SessionPayload::End, handler(FlowId::fresh(), 1)),
    );

    match result.continuation {
        Continuation::Resume {
            value: ResumeValue::Error { error },
        } => assert_eq!(error.cause, ErrorCause::SessionEnded { session_id: sid }),
        other => panic!("expected session-ended resume, got {other:?}"),
    }
}

#[test]
fn delivered_session_end_resumes_like_an_end_message() {
    let sid = SessionId::new(1);
    let state = awaiting(
        with_initiated_session(started(client_state(None)), sid, SessionId::new(2)),
        vec![sid],
    );
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::DeliverSessionEnded { session_id: sid });

    assert!(result.actions.is_empty());
    match result.continuation {
        Continuation::Resume {
            value: ResumeValue::Error { error },
        } => assert_eq!(error.cause, ErrorCause::SessionEnded { session_id: sid }),
        other => panic!("expected session-ended resume, got {other:?}"),
    }
}

#[test]
fn error_rejection_on_initiating_session() {
    let sid = SessionId::new(1);
    let mut state = started(client_state(None));
    initiating_with_buffer(&mut state, sid, vec![]);
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &message(
            sid,
            SessionPayload::Error(ErrorSessionMessage {
                error_id: ErrorId(3),
                exception: None,
            }),
            handler(FlowId::fresh(), 1),
        ),
    );

    match state_session(&result.state, sid) {
        SessionState::Initiating {
            rejection_error, ..
        } => assert!(rejection_error.is_some()),
        other => panic!("expected initiating session, got {other:?}"),
    }
}

#[test]
fn duplicate_delivery_in_one_window_records_one_fact() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let ctx = ctx_for(&state);
    let sender = FlowId::fresh();

    let result = transition(
        &ctx,
        &state,
        &message(sid, data(1, json!("Y")), handler(sender, 1)),
    );
    let result = transition(
        &ctx,
        &result.state,
        &message(sid, data(1, json!("Y")), handler(sender, 1)),
    );

    assert_eq!(result.state.checkpoint.pending_deduplication_facts.len(), 1);
    // Both deliveries still get acknowledged at the next commit
    assert_eq!(result.state.unacked_handlers.len(), 2);
    match state_session(&result.state, sid) {
        SessionState::Initiated {
            received_messages, ..
        } => assert_eq!(received_messages.len(), 1),
        other => panic!("expected initiated session, got {other:?}"),
    }
}
