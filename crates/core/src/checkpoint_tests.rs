// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::{ErrorCause, FlowException};
use serde_json::json;

fn client_context(client_id: Option<&str>) -> InvocationContext {
    InvocationContext {
        origin: FlowOrigin::Client {
            client_id: client_id.map(ClientId::from),
        },
        flow_name: "ping".into(),
        args: json!({"to": "node-b"}),
        started_at: DateTime::from_timestamp_millis(1_000_000).unwrap(),
    }
}

#[test]
fn unstarted_checkpoint_carries_args() {
    let cp = Checkpoint::unstarted(FlowId::fresh(), client_context(None));
    assert_eq!(cp.status, CheckpointStatus::Runnable);
    assert_eq!(cp.checkpoint_state.num_commits, 0);
    match &cp.flow_state {
        FlowState::Unstarted { args } => assert_eq!(args["to"], "node-b"),
        other => panic!("expected unstarted, got {other:?}"),
    }
}

#[test]
fn client_id_only_for_client_origin() {
    let cp = Checkpoint::unstarted(FlowId::fresh(), client_context(Some("c1")));
    assert_eq!(cp.client_id().map(ClientId::as_str), Some("c1"));

    let peer = InvocationContext {
        origin: FlowOrigin::Peer {
            party: PartyId::new("node-a"),
            initiator_session_id: SessionId::new(4),
        },
        flow_name: "pong".into(),
        args: serde_json::Value::Null,
        started_at: DateTime::from_timestamp_millis(0).unwrap(),
    };
    let cp = Checkpoint::unstarted(FlowId::fresh(), peer);
    assert!(cp.client_id().is_none());
}

#[test]
fn push_error_enters_and_extends_errored_state() {
    let mut cp = Checkpoint::unstarted(FlowId::fresh(), client_context(None));
    assert!(!cp.is_errored());

    cp.push_error(FlowError::fresh(ErrorCause::Exception(FlowException::new(
        "first",
    ))));
    cp.push_error(FlowError::fresh(ErrorCause::Timeout));

    match &cp.error_state {
        ErrorState::Errored {
            errors,
            propagated_index,
            propagating,
        } => {
            assert_eq!(errors.len(), 2);
            assert_eq!(*propagated_index, 0);
            assert!(!propagating);
        }
        ErrorState::Clean => panic!("expected errored state"),
    }
}

#[test]
fn dedup_and_op_sequences_are_monotonic() {
    let mut cp = Checkpoint::unstarted(FlowId::fresh(), client_context(None));
    assert_eq!(cp.next_dedup_seq(), 1);
    assert_eq!(cp.next_dedup_seq(), 2);
    assert_eq!(cp.next_op_seq(), 1);
    assert_eq!(cp.next_op_seq(), 2);
}

#[test]
fn terminal_statuses() {
    assert!(CheckpointStatus::Completed.is_terminal());
    assert!(CheckpointStatus::Failed.is_terminal());
    assert!(CheckpointStatus::Killed.is_terminal());
    assert!(!CheckpointStatus::Runnable.is_terminal());
    assert!(!CheckpointStatus::Hospitalized.is_terminal());
    assert!(!CheckpointStatus::Paused.is_terminal());
}

#[test]
fn checkpoint_serde_round_trip() {
    let mut cp = Checkpoint::unstarted(FlowId::fresh(), client_context(Some("c1")));
    cp.flow_state = FlowState::Started {
        reason: SuspendReason::Receive {
            sessions: vec![SessionId::new(1)],
        },
        frame: FlowFrame::from_value(json!({"step": 2})),
    };
    let encoded = serde_json::to_string(&cp).unwrap();
    let back: Checkpoint = serde_json::from_str(&encoded).unwrap();
    assert_eq!(back, cp);
}
