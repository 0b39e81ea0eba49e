// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Determinism: re-running any transition against the same pre-state
//! produces an identical post-state and action list.

use super::*;
use proptest::prelude::*;
use skein_core::{ErrorId, ErrorSessionMessage};

const SID: SessionId = SessionId(7);

fn arb_event() -> impl Strategy<Value = Event> {
    let sender = FlowId::fresh();
    prop_oneof![
        Just(Event::Start),
        Just(Event::SoftShutdown),
        Just(Event::RetryFromSafePoint),
        Just(Event::FlowTimeout),
        Just(Event::SleepFinished),
        Just(Event::StartErrorPropagation),
        Just(Event::Pause),
        Just(Event::Kill),
        Just(Event::Finished {
            result: json!("done")
        }),
        (1u64..5, "[a-z]{0,8}").prop_map(move |(seq, body)| Event::MessageReceived {
            session_id: SID,
            payload: data(seq, json!(body)),
            handler: handler(sender, seq),
        }),
        (1u64..100).prop_map(move |peer| Event::MessageReceived {
            session_id: SID,
            payload: SessionPayload::Confirm {
                initiated_session_id: SessionId::new(peer),
            },
            handler: handler(sender, 90),
        }),
        (0u64..3).prop_map(move |e| Event::MessageReceived {
            session_id: SID,
            payload: SessionPayload::Error(ErrorSessionMessage {
                error_id: ErrorId(e),
                exception: None,
            }),
            handler: handler(sender, 91),
        }),
        Just(Event::MessageReceived {
            session_id: SID,
            payload: SessionPayload::End,
            handler: handler(sender, 92),
        }),
        "[a-z]{0,8}".prop_map(|body| suspend_event(
            vec![FlowRequest::Send {
                session_id: SID,
                body: json!(body),
            }],
            SuspendReason::Receive {
                sessions: vec![SID]
            },
        )),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn rerunning_a_transition_is_byte_identical(
        phase in 0u8..3,
        event in arb_event(),
    ) {
        let state = match phase {
            0 => client_state(None),
            1 => started(client_state(None)),
            _ => {
                let s = with_initiated_session(started(client_state(None)), SID, SessionId::new(8));
                awaiting(s, vec![SID])
            }
        };

        let ctx = ctx_for(&state);
        let first = transition(&ctx, &state, &event);
        let second = transition(&ctx, &state, &event);

        prop_assert_eq!(&first.state, &second.state);
        prop_assert_eq!(&first.continuation, &second.continuation);
        // Byte-identical action lists
        let a = serde_json::to_vec(&first.actions).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let b = serde_json::to_vec(&second.actions).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(a, b);
    }
}
