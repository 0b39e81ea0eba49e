// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests: encode → decode is the identity for every session
//! message the engine can produce.

use crate::envelope::{ExistingSessionMessage, InitialSessionMessage};
use crate::wire::{decode, encode};
use proptest::prelude::*;
use skein_core::{ErrorId, ErrorSessionMessage, FlowException, SessionId, SessionPayload};

fn arb_payload() -> impl Strategy<Value = SessionPayload> {
    prop_oneof![
        (any::<u64>(), "[a-z]{0,16}").prop_map(|(seq, s)| SessionPayload::Data {
            seq,
            body: serde_json::Value::String(s),
        }),
        any::<u64>().prop_map(|id| SessionPayload::Confirm {
            initiated_session_id: SessionId::new(id),
        }),
        Just(SessionPayload::End),
        (any::<u64>(), proptest::option::of("[a-z ]{0,32}")).prop_map(|(id, msg)| {
            SessionPayload::Error(ErrorSessionMessage {
                error_id: ErrorId(id),
                exception: msg.map(FlowException::new),
            })
        }),
    ]
}

proptest! {
    #[test]
    fn existing_message_encode_decode_identity(
        recipient in any::<u64>(),
        payload in arb_payload(),
    ) {
        let original = ExistingSessionMessage {
            recipient_session_id: SessionId::new(recipient),
            payload,
        };
        let bytes = encode(&original).unwrap();
        let back: ExistingSessionMessage = decode(&bytes).unwrap();
        prop_assert_eq!(back, original);
    }

    #[test]
    fn initial_message_encode_decode_identity(
        session in any::<u64>(),
        flow_name in "[a-z-]{1,24}",
        version in 1u32..100,
        payload in proptest::option::of("[a-z]{0,16}"),
    ) {
        let original = InitialSessionMessage {
            initiator_session_id: SessionId::new(session),
            flow_name,
            app_name: "skein".into(),
            platform_version: version,
            payload: payload.map(serde_json::Value::String),
        };
        let bytes = encode(&original).unwrap();
        let back: InitialSessionMessage = decode(&bytes).unwrap();
        prop_assert_eq!(back, original);
    }
}
