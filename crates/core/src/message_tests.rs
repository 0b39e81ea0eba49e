// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn payload_serde_uses_type_tags() {
    let data = SessionPayload::Data {
        seq: 3,
        body: json!({"x": 1}),
    };
    let encoded = serde_json::to_string(&data).unwrap();
    assert!(encoded.contains("\"type\":\"payload:data\""));

    let end = serde_json::to_string(&SessionPayload::End).unwrap();
    assert!(end.contains("\"type\":\"payload:end\""));
}

#[test]
fn error_message_omits_absent_exception() {
    let msg = ErrorSessionMessage {
        error_id: ErrorId(5),
        exception: None,
    };
    let encoded = serde_json::to_string(&msg).unwrap();
    assert!(!encoded.contains("exception"));
}

#[test]
fn payload_round_trip() {
    let payload = SessionPayload::Error(ErrorSessionMessage {
        error_id: ErrorId(9),
        exception: Some(FlowException::new("nope")),
    });
    let encoded = serde_json::to_string(&payload).unwrap();
    let back: SessionPayload = serde_json::from_str(&encoded).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn payload_names() {
    assert_eq!(
        SessionPayload::Confirm {
            initiated_session_id: SessionId::new(1)
        }
        .name(),
        "confirm"
    );
    assert_eq!(SessionPayload::End.name(), "end");
}
