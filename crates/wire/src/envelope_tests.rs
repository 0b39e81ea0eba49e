// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::wire::{decode, encode};
use skein_core::{ErrorId, ErrorSessionMessage, FlowException, FlowId};
use serde_json::json;

fn initial() -> InitialSessionMessage {
    InitialSessionMessage {
        initiator_session_id: SessionId::new(11),
        flow_name: "ping".into(),
        app_name: "skein".into(),
        platform_version: 1,
        payload: Some(json!({"greeting": "hello"})),
    }
}

#[test]
fn initial_message_round_trip_is_identity() {
    let original = initial();
    let bytes = encode(&original).unwrap();
    let back: InitialSessionMessage = decode(&bytes).unwrap();
    assert_eq!(back, original);
}

#[test]
fn existing_message_round_trip_is_identity() {
    let original = ExistingSessionMessage {
        recipient_session_id: SessionId::new(7),
        payload: SessionPayload::Error(ErrorSessionMessage {
            error_id: ErrorId(3),
            exception: Some(FlowException::new("nope")),
        }),
    };
    let bytes = encode(&original).unwrap();
    let back: ExistingSessionMessage = decode(&bytes).unwrap();
    assert_eq!(back, original);
}

#[test]
fn envelope_flattens_the_message_tag() {
    let envelope = Envelope {
        sender: PartyId::new("node-a"),
        destination: PartyId::new("node-b"),
        dedup_id: DedupId::Message {
            sender: FlowId::fresh(),
            seq: 1,
        },
        message: SessionMessage::Initial(initial()),
    };
    let encoded = serde_json::to_string(&envelope).unwrap();
    assert!(encoded.contains("\"message\":\"initial\""));
    let back: Envelope = serde_json::from_str(&encoded).unwrap();
    assert_eq!(back, envelope);
}

#[test]
fn absent_initial_payload_is_omitted() {
    let mut message = initial();
    message.payload = None;
    let encoded = serde_json::to_string(&message).unwrap();
    assert!(!encoded.contains("payload"));
}
