// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::checkpoint::{FlowOrigin, InvocationContext};
use chrono::DateTime;

fn checkpoint() -> Checkpoint {
    Checkpoint::unstarted(
        FlowId::fresh(),
        InvocationContext {
            origin: FlowOrigin::Client { client_id: None },
            flow_name: "ping".into(),
            args: serde_json::Value::Null,
            started_at: DateTime::from_timestamp_millis(0).unwrap(),
        },
    )
}

#[test]
fn bracketing_actions_have_no_fields() {
    assert!(Action::CreateTransaction.fields().is_empty());
    assert!(Action::CommitTransaction.fields().is_empty());
    assert!(Action::RollbackTransaction.fields().is_empty());
}

#[test]
fn persist_checkpoint_logs_version() {
    let cp = checkpoint();
    let id = cp.id;
    let action = Action::PersistCheckpoint {
        id,
        checkpoint: Box::new(cp),
        is_update: false,
    };
    let fields = action.fields();
    assert!(fields.iter().any(|(k, _)| *k == "num_commits"));
    assert_eq!(action.name(), "checkpoint:persist");
}

#[test]
fn frequent_actions_are_terse() {
    assert!(!Action::CommitTransaction.verbose());
    assert!(!Action::PersistDeduplicationFacts { facts: vec![] }.verbose());
    assert!(Action::RemoveFlow {
        id: FlowId::fresh(),
        outcome: FlowOutcome::OrderlyFinish {
            result: serde_json::Value::Null
        },
    }
    .verbose());
}

#[test]
fn action_serde_round_trip() {
    let action = Action::SendExisting {
        send: ExistingSend {
            peer: PartyId::new("node-b"),
            recipient_session_id: SessionId::new(4),
            payload: SessionPayload::Data {
                seq: 1,
                body: serde_json::json!("x"),
            },
            dedup_id: DedupId::Message {
                sender: FlowId::fresh(),
                seq: 1,
            },
        },
    };
    let encoded = serde_json::to_string(&action).unwrap();
    assert!(encoded.contains("\"type\":\"bus:send-existing\""));
    let back: Action = serde_json::from_str(&encoded).unwrap();
    assert_eq!(back, action);
}
