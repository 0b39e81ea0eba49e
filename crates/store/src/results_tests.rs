// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use skein_core::{ErrorCause, FlowError};

#[test]
fn record_then_get() {
    let store = MemoryResultStore::new();
    let client = ClientId::new("c1");
    let outcome = FlowOutcome::OrderlyFinish {
        result: json!({"answer": 42}),
    };

    store.record(&client, &outcome).unwrap();

    assert_eq!(store.get(&client).unwrap(), Some(outcome));
    assert!(store.get(&ClientId::new("other")).unwrap().is_none());
}

#[test]
fn error_outcomes_are_retrievable() {
    let store = MemoryResultStore::new();
    let client = ClientId::new("c1");
    let outcome = FlowOutcome::ErrorFinish {
        errors: vec![FlowError::fresh(ErrorCause::Timeout)],
    };

    store.record(&client, &outcome).unwrap();

    match store.get(&client).unwrap() {
        Some(FlowOutcome::ErrorFinish { errors }) => assert_eq!(errors.len(), 1),
        other => panic!("expected error finish, got {other:?}"),
    }
}
