// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use skein_core::ErrorCause;

#[test]
fn finish_ends_live_sessions_and_removes_the_flow() {
    let sid = SessionId::new(1);
    let peer_sid = SessionId::new(2);
    let state = with_initiated_session(started(client_state(None)), sid, peer_sid);
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &Event::Finished {
            result: json!("done"),
        },
    );

    let names = action_names(&result);
    assert_eq!(
        names,
        vec![
            "bus:send-multiple",
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
        Some(Action::SendMultiple { sends }) => {
            assert_eq!(sends.len(), 1);
            assert_eq!(sends[0].payload, SessionPayload::End);
            assert_eq!(sends[0].recipient_session_id, peer_sid);
        }
        other => panic!("expected end messages, got {other:?}"),
    }
    match result.actions.last() {
        Some(Action::RemoveFlow { outcome, .. }) => {
            assert_eq!(
                outcome,
                &FlowOutcome::OrderlyFinish {
                    result: json!("done")
                }
            );
        }
        other => panic!("expected flow removal, got {other:?}"),
    }
    assert_eq!(
        result.state.checkpoint.status,
        skein_core::CheckpointStatus::Completed
    );
    assert!(result.state.removed);
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn finish_with_client_id_keeps_the_row_and_records_the_result() {
    let state = started(client_state(Some("c1")));
    let ctx = ctx_for(&state);

    let result = transition(
        &ctx,
        &state,
        &Event::Finished {
            result: json!(42),
        },
    );

    let names = action_names(&result);
    assert!(names.contains(&"checkpoint:persist"));
    assert!(!names.contains(&"checkpoint:remove"));
    let recorded = result.actions.iter().find_map(|action| match action {
        Action::RecordResult { client_id, outcome } => Some((client_id.clone(), outcome.clone())),
        _ => None,
    });
    let (client_id, outcome) = recorded.expect("client result must be recorded");
    assert_eq!(client_id.as_str(), "c1");
    assert_eq!(outcome, FlowOutcome::OrderlyFinish { result: json!(42) });
}

#[test]
fn kill_propagates_and_removes_immediately() {
    let sid = SessionId::new(1);
    let state = with_initiated_session(started(client_state(None)), sid, SessionId::new(2));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::Kill);

    let names = action_names(&result);
    assert!(names.contains(&"bus:propagate-errors"));
    assert!(names.contains(&"checkpoint:remove"));
    assert!(names.contains(&"flow:remove"));
    assert_eq!(
        result.state.checkpoint.status,
        skein_core::CheckpointStatus::Killed
    );
    match result.actions.iter().find_map(|action| match action {
        Action::RemoveFlow { outcome, .. } => Some(outcome.clone()),
        _ => None,
    }) {
        Some(FlowOutcome::ErrorFinish { errors }) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].cause, ErrorCause::Killed);
        }
        other => panic!("expected killed error finish, got {other:?}"),
    }
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn killed_client_flow_still_records_its_outcome() {
    let state = started(client_state(Some("c1")));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::Kill);

    // Row removed, but the result row survives for the client
    let remove = result.actions.iter().find_map(|action| match action {
        Action::RemoveCheckpoint {
            may_have_persistent_results,
            ..
        } => Some(*may_have_persistent_results),
        _ => None,
    });
    assert_eq!(remove, Some(true));
    assert!(action_names(&result).contains(&"result:record"));
}

#[test]
fn retry_makes_no_state_change() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::RetryFromSafePoint);

    assert_eq!(
        action_names(&result),
        vec!["txn:rollback", "flow:retry-from-safe-point"]
    );
    assert_eq!(result.state, state);
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn flow_timeout_retries_from_safe_point() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::FlowTimeout);

    assert!(action_names(&result).contains(&"flow:retry-from-safe-point"));
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn pause_persists_the_paused_status() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::Pause);

    let persisted = persisted_checkpoint(&result).expect("pause must persist");
    assert_eq!(persisted.status, skein_core::CheckpointStatus::Paused);
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn soft_shutdown_parks_without_side_effects() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);

    let result = transition(&ctx, &state, &Event::SoftShutdown);

    assert!(result.actions.is_empty());
    assert_eq!(result.state, state);
    assert!(matches!(result.continuation, Continuation::Abort));
}

#[test]
fn no_actions_reference_a_removed_flow() {
    let state = started(client_state(None));
    let ctx = ctx_for(&state);
    let state = transition(
        &ctx,
        &state,
        &Event::Finished {
            result: json!(null),
        },
    )
    .state;

    // A straggler message after removal produces no actions
    let result = transition(
        &ctx,
        &state,
        &message(
            SessionId::new(9),
            data(1, json!("late")),
            handler(FlowId::fresh(), 1),
        ),
    );
    assert!(result.actions.is_empty());

    let result = transition(&ctx, &result.state, &Event::SleepFinished);
    assert!(result.actions.is_empty());
}
