// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

struct Doubler;

#[async_trait]
impl AsyncOperation for Doubler {
    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, FlowException> {
        let n = params
            .as_u64()
            .ok_or_else(|| FlowException::new("expected a number"))?;
        Ok(json!(n * 2))
    }
}

#[tokio::test]
async fn submit_surfaces_completion_event() {
    let mut registry = OperationRegistry::new();
    registry.register("double", Arc::new(Doubler));
    let (tx, mut rx) = mpsc::channel(4);

    registry.submit(FlowId::fresh(), 1, OperationSpec {
        name: "double".into(),
        params: json!(21),
    }, tx);

    match rx.recv().await.unwrap() {
        Event::AsyncOpCompleted { op_seq, outcome } => {
            assert_eq!(op_seq, 1);
            assert_eq!(outcome, OpOutcome::Completed { result: json!(42) });
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn operation_failure_is_surfaced() {
    let mut registry = OperationRegistry::new();
    registry.register("double", Arc::new(Doubler));
    let (tx, mut rx) = mpsc::channel(4);

    registry.submit(FlowId::fresh(), 2, OperationSpec {
        name: "double".into(),
        params: json!("not a number"),
    }, tx);

    match rx.recv().await.unwrap() {
        Event::AsyncOpCompleted { outcome: OpOutcome::Failed { exception }, .. } => {
            assert_eq!(exception.message, "expected a number");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_operation_fails_cleanly() {
    let registry = OperationRegistry::new();
    let (tx, mut rx) = mpsc::channel(4);

    registry.submit(FlowId::fresh(), 3, OperationSpec {
        name: "missing".into(),
        params: json!(null),
    }, tx);

    match rx.recv().await.unwrap() {
        Event::AsyncOpCompleted { outcome: OpOutcome::Failed { exception }, .. } => {
            assert!(exception.message.contains("unknown operation"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}
