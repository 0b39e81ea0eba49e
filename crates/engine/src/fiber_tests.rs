// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use skein_core::{FlowFrame, FlowYield, ResumeValue};

struct CountingFlow;

impl FlowLogic for CountingFlow {
    fn on_start(&mut self, args: serde_json::Value, _ctx: &FlowCtx) -> FlowYield {
        FlowYield::Suspend {
            requests: vec![],
            reason: skein_core::SuspendReason::Yield,
            frame: FlowFrame::from_value(json!({"count": args})),
        }
    }

    fn on_resume(&mut self, frame: FlowFrame, _value: ResumeValue, _ctx: &FlowCtx) -> FlowYield {
        FlowYield::Finish {
            result: frame.as_value().clone(),
        }
    }
}

#[test]
fn registry_creates_fresh_instances() {
    let mut registry = FlowRegistry::new();
    registry.register("counting", || Box::new(CountingFlow));

    assert!(registry.contains("counting"));
    assert!(!registry.contains("missing"));
    assert!(registry.create("counting").is_some());
    assert!(registry.create("missing").is_none());
}

#[test]
fn frame_round_trips_through_a_step() {
    let mut registry = FlowRegistry::new();
    registry.register("counting", || Box::new(CountingFlow));
    let mut flow = registry.create("counting").unwrap();

    let ctx = FlowCtx {
        flow_id: FlowId::fresh(),
        party: PartyId::new("node-a"),
        initiator_session: None,
    };

    let frame = match flow.on_start(json!(7), &ctx) {
        FlowYield::Suspend { frame, .. } => frame,
        other => panic!("expected suspend, got {other:?}"),
    };
    match flow.on_resume(frame, ResumeValue::Unit, &ctx) {
        FlowYield::Finish { result } => assert_eq!(result, json!({"count": 7})),
        other => panic!("expected finish, got {other:?}"),
    }
}
