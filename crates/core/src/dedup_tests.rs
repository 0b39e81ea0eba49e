// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn message_and_error_ids_never_collide() {
    let flow = FlowId::fresh();
    let msg = DedupId::Message {
        sender: flow,
        seq: 1,
    };
    let err = DedupId::Error {
        error_id: ErrorId::fresh(),
        source_session: SessionId::new(1),
    };
    assert_ne!(msg, err);
}

#[test]
fn same_sender_distinct_seq_are_distinct() {
    let flow = FlowId::fresh();
    let a = DedupId::Message {
        sender: flow,
        seq: 1,
    };
    let b = DedupId::Message {
        sender: flow,
        seq: 2,
    };
    assert_ne!(a, b);
}

#[test]
fn dedup_id_serde_round_trip() {
    let id = DedupId::Error {
        error_id: ErrorId(7),
        source_session: SessionId::new(9),
    };
    let json = serde_json::to_string(&id).unwrap();
    assert!(json.contains("\"kind\":\"error\""));
    let back: DedupId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
