// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn start_persists_and_resumes_with_args() {
    let state = client_state(None);
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::Start);

    assert_eq!(
        action_names(&result),
        vec!["txn:create", "txn:track", "checkpoint:persist", "txn:commit"]
    );
    match result.continuation {
        Continuation::Resume {
            value: ResumeValue::Args { args },
        } => assert_eq!(args["to"], "node-b"),
        other => panic!("expected args resume, got {other:?}"),
    }
    assert_eq!(result.state.checkpoint.checkpoint_state.num_commits, 1);
}

#[test]
fn first_persist_is_an_insert_not_an_update() {
    let state = client_state(None);
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::Start);

    let is_update = result.actions.iter().find_map(|action| match action {
        Action::PersistCheckpoint { is_update, .. } => Some(*is_update),
        _ => None,
    });
    assert_eq!(is_update, Some(false));
}

#[test]
fn timed_start_schedules_the_flow_timeout() {
    let state = client_state(None);
    let mut ctx = ctx_for(&state);
    ctx.timed = true;

    let result = transition(&ctx, &state, &Event::Start);

    assert!(action_names(&result).contains(&"timer:schedule"));
}

#[test]
fn responder_start_confirms_with_swapped_tokens() {
    let initiator_session = SessionId::new(11);
    let our_session = SessionId::new(22);
    let state = responder_state(initiator_session, our_session);
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::Start);

    let confirm = result.actions.iter().find_map(|action| match action {
        Action::SendExisting { send } => Some(send.clone()),
        _ => None,
    });
    let send = confirm.expect("responder start should emit a confirmation");
    assert_eq!(send.recipient_session_id, initiator_session);
    assert_eq!(
        send.payload,
        SessionPayload::Confirm {
            initiated_session_id: our_session
        }
    );
    // Confirmation goes out before the transaction bracket
    assert_eq!(action_names(&result)[0], "bus:send-existing");
}

#[test]
fn data_arriving_before_start_is_buffered() {
    let initiator_session = SessionId::new(11);
    let our_session = SessionId::new(22);
    let state = responder_state(initiator_session, our_session);
    let ctx = ctx_for(&state);
    let sender = FlowId::fresh();

    let result = transition(
        &ctx,
        &state,
        &message(our_session, data(2, json!("early")), handler(sender, 2)),
    );

    assert!(result.actions.is_empty());
    assert!(matches!(result.continuation, Continuation::ProcessEvents));
    match result.state.checkpoint.checkpoint_state.sessions.get(&our_session) {
        Some(SessionState::Initiated {
            received_messages, ..
        }) => assert_eq!(received_messages.len(), 1),
        other => panic!("expected initiated session, got {other:?}"),
    }
    assert_eq!(
        result.state.checkpoint.pending_deduplication_facts,
        vec![DedupId::Message { sender, seq: 2 }]
    );
}

#[test]
fn replayed_start_on_started_flow_is_a_no_op() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::Start);

    assert!(result.actions.is_empty());
    assert_eq!(result.state, state);
    assert!(matches!(result.continuation, Continuation::ProcessEvents));
}
