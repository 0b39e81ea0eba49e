// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use skein_core::{ErrorCause, OperationSpec};

#[test]
fn first_send_opens_the_session_with_an_initial_message() {
    let sid = SessionId::new(1);
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(
            vec![
                FlowRequest::Initiate {
                    session_id: sid,
                    destination: PartyId::new("node-b"),
                    flow_name: "pong".into(),
                },
                FlowRequest::Send {
                    session_id: sid,
                    body: json!("X"),
                },
            ],
            SuspendReason::Receive {
                sessions: vec![sid],
            },
        ),
    );

    // Initial message goes out before the transaction bracket
    assert_eq!(
        action_names(&result),
        vec![
            "bus:send-initial",
            "txn:create",
            "txn:track",
            "checkpoint:persist",
            "txn:commit"
        ]
    );
    match result.actions.first() {
        Some(Action::SendInitial {
            destination,
            initiator_session_id,
            payload,
            ..
        }) => {
            assert_eq!(destination.as_str(), "node-b");
            assert_eq!(*initiator_session_id, sid);
            assert_eq!(payload.clone(), Some(json!("X")));
        }
        other => panic!("expected initial send, got {other:?}"),
    }
    match result.state.checkpoint.checkpoint_state.sessions.get(&sid) {
        Some(SessionState::Initiating { sent, .. }) => assert!(sent),
        other => panic!("expected initiating session, got {other:?}"),
    }
    assert!(matches!(result.continuation, Continuation::ProcessEvents));
}

#[test]
fn sends_while_initiating_are_buffered() {
    let sid = SessionId::new(1);
    let mut state = started(client_state(None));
    state.checkpoint.checkpoint_state.sessions.insert(
        sid,
        SessionState::Initiating {
            our_session_id: sid,
            destination: PartyId::new("node-b"),
            flow_name: "pong".into(),
            sent: true,
            buffered_messages: vec![],
            rejection_error: None,
            next_send_seq: 2,
        },
    );
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(
            vec![FlowRequest::Send {
                session_id: sid,
                body: json!("Y"),
            }],
            SuspendReason::Yield,
        ),
    );

    // No bus action: the payload waits for the confirmation
    assert!(!action_names(&result).contains(&"bus:send-existing"));
    match result.state.checkpoint.checkpoint_state.sessions.get(&sid) {
        Some(SessionState::Initiating {
            buffered_messages,
            next_send_seq,
            ..
        }) => {
            assert_eq!(buffered_messages.len(), 1);
            assert_eq!(*next_send_seq, 3);
            assert_eq!(buffered_messages[0].1, data(2, json!("Y")));
        }
        other => panic!("expected initiating session, got {other:?}"),
    }
}

#[test]
fn send_on_initiated_session_goes_straight_out() {
    let sid = SessionId::new(1);
    let peer_sid = SessionId::new(2);
    let state = with_initiated_session(started(client_state(None)), sid, peer_sid);
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(
            vec![FlowRequest::Send {
                session_id: sid,
                body: json!("X"),
            }],
            SuspendReason::Yield,
        ),
    );

    let send = result.actions.iter().find_map(|action| match action {
        Action::SendExisting { send } => Some(send.clone()),
        _ => None,
    });
    let send = send.expect("expected an existing-session send");
    assert_eq!(send.recipient_session_id, peer_sid);
    assert_eq!(send.payload, data(1, json!("X")));
}

#[test]
fn receive_before_send_still_opens_the_session() {
    let sid = SessionId::new(1);
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(
            vec![FlowRequest::Initiate {
                session_id: sid,
                destination: PartyId::new("node-b"),
                flow_name: "pong".into(),
            }],
            SuspendReason::Receive {
                sessions: vec![sid],
            },
        ),
    );

    match result.actions.first() {
        Some(Action::SendInitial { payload, .. }) => assert!(payload.is_none()),
        other => panic!("expected payload-free initial send, got {other:?}"),
    }
}

#[test]
fn satisfied_receive_resumes_but_persists_unconsumed() {
    let sid = SessionId::new(1);
    let mut state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    if let Some(SessionState::Initiated {
        received_messages, ..
    }) = state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
    {
        received_messages.push((1, json!("Y")));
    }
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(
            vec![],
            SuspendReason::Receive {
                sessions: vec![sid],
            },
        ),
    );

    // Resumes with the buffered message...
    match &result.continuation {
        Continuation::Resume {
            value: ResumeValue::SessionData { messages },
        } => assert_eq!(messages, &vec![(sid, json!("Y"))]),
        other => panic!("expected session data resume, got {other:?}"),
    }
    // ...while the durable snapshot still holds it: the pop is replayed
    // from the checkpoint after a crash.
    let persisted = persisted_checkpoint(&result).expect("suspend must persist");
    match persisted.checkpoint_state.sessions.get(&sid) {
        Some(SessionState::Initiated {
            received_messages, ..
        }) => assert_eq!(received_messages.len(), 1),
        other => panic!("expected initiated session, got {other:?}"),
    }
    // The in-memory state has consumed it.
    match result.state.checkpoint.checkpoint_state.sessions.get(&sid) {
        Some(SessionState::Initiated {
            received_messages, ..
        }) => assert!(received_messages.is_empty()),
        other => panic!("expected initiated session, got {other:?}"),
    }
}

#[test]
fn yield_commits_then_resumes_immediately() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &suspend_event(vec![], SuspendReason::Yield));

    assert!(action_names(&result).contains(&"checkpoint:persist"));
    assert!(matches!(
        result.continuation,
        Continuation::Resume {
            value: ResumeValue::Unit
        }
    ));
}

#[test]
fn sleep_emits_the_wakeup_timer() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(vec![], SuspendReason::SleepUntil { until_epoch_ms: 5_000 }),
    );

    assert!(matches!(
        result.actions.first(),
        Some(Action::SleepUntil {
            until_epoch_ms: 5_000,
            ..
        })
    ));
    assert!(matches!(result.continuation, Continuation::ProcessEvents));
}

#[test]
fn await_operation_allocates_the_sequence() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(
            vec![],
            SuspendReason::AwaitOperation {
                // Fiber-supplied sequence is a placeholder
                op_seq: 0,
                operation: OperationSpec {
                    name: "notarise".into(),
                    params: json!({"tx": 1}),
                },
            },
        ),
    );

    match result.actions.first() {
        Some(Action::ExecuteAsyncOperation { op_seq, operation, .. }) => {
            assert_eq!(*op_seq, 1);
            assert_eq!(operation.name, "notarise");
        }
        other => panic!("expected operation submission, got {other:?}"),
    }
    match &result.state.checkpoint.flow_state {
        skein_core::FlowState::Started {
            reason: SuspendReason::AwaitOperation { op_seq, .. },
            ..
        } => assert_eq!(*op_seq, 1),
        other => panic!("expected await-operation suspension, got {other:?}"),
    }
}

#[test]
fn suspend_persists_pending_facts_and_acks_after_commit() {
    let sid = SessionId::new(1);
    let sender = FlowId::fresh();
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let ctx = ctx_for(&state);

    // A message arrives first (no suspension yet, so it just buffers)
    let result = transition(
        &ctx,
        &state,
        &message(sid, data(1, json!("Y")), handler(sender, 1)),
    );
    let state = result.state;

    // The next suspension carries the fact and the acknowledgement
    let result = transition(&ctx, &state, &suspend_event(vec![], SuspendReason::Yield));

    assert_eq!(
        action_names(&result),
        vec![
            "txn:create",
            "txn:track",
            "checkpoint:persist",
            "dedup:persist",
            "txn:commit",
            "bus:ack"
        ]
    );
    // A fact never survives its own commit in the checkpoint
    let persisted = persisted_checkpoint(&result).expect("suspend must persist");
    assert!(persisted.pending_deduplication_facts.is_empty());
    assert!(result.state.checkpoint.pending_deduplication_facts.is_empty());
    assert!(result.state.unacked_handlers.is_empty());
}

#[test]
fn send_on_session_with_pending_error_resumes_with_it() {
    let sid = SessionId::new(1);
    let mut state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let peer_error = FlowError::from_peer(skein_core::ErrorId(9), None);
    if let Some(SessionState::Initiated {
        errors,
        other_side_errored,
        ..
    }) = state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
    {
        *other_side_errored = true;
        errors.push(peer_error.clone());
    }
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(
            vec![FlowRequest::Send {
                session_id: sid,
                body: json!("X"),
            }],
            SuspendReason::Yield,
        ),
    );

    assert!(result.actions.is_empty(), "nothing commits before the rethrow");
    match result.continuation {
        Continuation::Resume {
            value: ResumeValue::Error { error },
        } => assert_eq!(error, peer_error),
        other => panic!("expected error resume, got {other:?}"),
    }
}

#[test]
fn close_sends_end_and_drops_the_session() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(vec![FlowRequest::Close { session_id: sid }], SuspendReason::Yield),
    );

    let end = result.actions.iter().find_map(|action| match action {
        Action::SendExisting { send } => Some(send.payload.clone()),
        _ => None,
    });
    assert_eq!(end, Some(SessionPayload::End));
    assert!(!result
        .state
        .checkpoint
        .checkpoint_state
        .sessions
        .contains_key(&sid));
    assert!(action_names(&result).contains(&"session:remove-bindings"));
}

#[test]
fn receive_on_closed_session_surfaces_session_ended() {
    let sid = SessionId::new(1);
    let mut state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    if let Some(SessionState::Initiated {
        other_side_closed, ..
    }) = state.checkpoint.checkpoint_state.sessions.get_mut(&sid)
    {
        *other_side_closed = true;
    }
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &suspend_event(
            vec![],
            SuspendReason::Receive {
                sessions: vec![sid],
            },
        ),
    );

    match result.continuation {
        Continuation::Resume {
            value: ResumeValue::Error { error },
        } => assert_eq!(error.cause, ErrorCause::SessionEnded { session_id: sid }),
        other => panic!("expected session-ended resume, got {other:?}"),
    }
}
