// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenario specs: two engines peered over one in-memory
//! bus, exercising the full stack — fibers, transitions, executor, stores,
//! session protocol, and error propagation.

use serde_json::json;
use skein_core::{
    ClientId, ErrorCause, FlowFrame, FlowOutcome, FlowRequest, FlowYield, OperationSpec, PartyId,
    ResumeValue, SessionId, SessionPayload, SuspendReason, SystemClock,
};
use skein_engine::{
    AsyncOperation, DefaultHospital, Engine, EngineConfig, EngineDeps, FlowCtx, FlowLogic,
    FlowRegistry, InMemoryBus, MessageBus, OperationRegistry, TokioTimerService,
};
use skein_store::{
    CheckpointStore, DedupLog, FileCheckpointStore, FileDedupLog, MemoryCheckpointStore,
    MemoryDedupLog, MemoryResultStore, ResultStore,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Initiator half of the two-party exchange: opens a session to the peer
/// named in the args, sends "X", waits for one reply, finishes with it.
struct PingFlow;

impl FlowLogic for PingFlow {
    fn on_start(&mut self, args: serde_json::Value, ctx: &FlowCtx) -> FlowYield {
        let sid = ctx.session_token(1);
        let peer = args["peer"].as_str().unwrap_or("node-b").to_string();
        let flow_name = args["responder"].as_str().unwrap_or("pong").to_string();
        FlowYield::Suspend {
            requests: vec![
                FlowRequest::Initiate {
                    session_id: sid,
                    destination: PartyId::new(peer),
                    flow_name,
                },
                FlowRequest::Send {
                    session_id: sid,
                    body: json!("X"),
                },
            ],
            reason: SuspendReason::Receive {
                sessions: vec![sid],
            },
            frame: FlowFrame::from_value(json!({"sid": sid.value()})),
        }
    }

    fn on_resume(&mut self, _frame: FlowFrame, value: ResumeValue, _ctx: &FlowCtx) -> FlowYield {
        match value {
            ResumeValue::SessionData { messages } => FlowYield::Finish {
                result: messages[0].1.clone(),
            },
            ResumeValue::Error { error } => FlowYield::Throw {
                exception: error.to_exception(),
            },
            _ => FlowYield::Finish {
                result: serde_json::Value::Null,
            },
        }
    }
}

/// Responder half: reads the first message, answers "Y", finishes.
struct PongFlow;

impl FlowLogic for PongFlow {
    fn on_start(&mut self, _args: serde_json::Value, ctx: &FlowCtx) -> FlowYield {
        let sid = ctx.initiator_session.unwrap_or(SessionId::new(0));
        FlowYield::Suspend {
            requests: vec![],
            reason: SuspendReason::Receive {
                sessions: vec![sid],
            },
            frame: FlowFrame::from_value(json!({"sid": sid.value(), "step": "receiving"})),
        }
    }

    fn on_resume(&mut self, frame: FlowFrame, value: ResumeValue, _ctx: &FlowCtx) -> FlowYield {
        let sid = SessionId::new(frame.as_value()["sid"].as_u64().unwrap_or(0));
        match (frame.as_value()["step"].as_str(), value) {
            (Some("receiving"), ResumeValue::SessionData { .. }) => FlowYield::Suspend {
                requests: vec![FlowRequest::Send {
                    session_id: sid,
                    body: json!("Y"),
                }],
                reason: SuspendReason::Yield,
                frame: FlowFrame::from_value(json!({"sid": sid.value(), "step": "replied"})),
            },
            (Some("replied"), _) => FlowYield::Finish {
                result: json!("pong-done"),
            },
            (_, ResumeValue::Error { error }) => FlowYield::Throw {
                exception: error.to_exception(),
            },
            (step, value) => panic!("unexpected resume at {step:?}: {value:?}"),
        }
    }
}

/// Responder that raises a user exception after reading the request.
struct GrumpyFlow;

impl FlowLogic for GrumpyFlow {
    fn on_start(&mut self, _args: serde_json::Value, ctx: &FlowCtx) -> FlowYield {
        let sid = ctx.initiator_session.unwrap_or(SessionId::new(0));
        FlowYield::Suspend {
            requests: vec![],
            reason: SuspendReason::Receive {
                sessions: vec![sid],
            },
            frame: FlowFrame::from_value(json!({"sid": sid.value()})),
        }
    }

    fn on_resume(&mut self, _frame: FlowFrame, _value: ResumeValue, _ctx: &FlowCtx) -> FlowYield {
        FlowYield::Throw {
            exception: skein_core::FlowException::new("nope"),
        }
    }
}

/// Awaits an operation that hangs on its first attempt and succeeds on the
/// retry after the flow timeout fires.
struct TimedFlow;

impl FlowLogic for TimedFlow {
    fn on_start(&mut self, _args: serde_json::Value, _ctx: &FlowCtx) -> FlowYield {
        FlowYield::Suspend {
            requests: vec![],
            reason: SuspendReason::AwaitOperation {
                op_seq: 0,
                operation: OperationSpec {
                    name: "notarise".into(),
                    params: json!(null),
                },
            },
            frame: FlowFrame::default(),
        }
    }

    fn on_resume(&mut self, _frame: FlowFrame, value: ResumeValue, _ctx: &FlowCtx) -> FlowYield {
        match value {
            ResumeValue::Operation { result } => FlowYield::Finish { result },
            ResumeValue::Error { error } => FlowYield::Throw {
                exception: error.to_exception(),
            },
            _ => FlowYield::Finish {
                result: serde_json::Value::Null,
            },
        }
    }
}

/// First call never completes; every later call answers immediately.
struct FlakyNotary {
    calls: AtomicU32,
}

#[async_trait::async_trait]
impl AsyncOperation for FlakyNotary {
    async fn execute(
        &self,
        _params: serde_json::Value,
    ) -> Result<serde_json::Value, skein_core::FlowException> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(json!("notarised"))
    }
}

struct TestNode {
    engine: Engine<SystemClock>,
    checkpoints: Arc<MemoryCheckpointStore>,
    dedup: Arc<MemoryDedupLog>,
    results: Arc<MemoryResultStore>,
}

fn registry() -> FlowRegistry {
    let mut registry = FlowRegistry::new();
    registry.register("ping", || Box::new(PingFlow));
    registry.register("pong", || Box::new(PongFlow));
    registry.register("grumpy", || Box::new(GrumpyFlow));
    registry.register("timed", || Box::new(TimedFlow));
    registry
}

fn build_node(bus: Arc<InMemoryBus>, party: &str, flow_timeout_ms: Option<u64>) -> TestNode {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let dedup = Arc::new(MemoryDedupLog::new());
    let results = Arc::new(MemoryResultStore::new());
    let mut operations = OperationRegistry::new();
    operations.register(
        "notarise",
        Arc::new(FlakyNotary {
            calls: AtomicU32::new(0),
        }),
    );

    let mut config = EngineConfig::for_party(party);
    config.flow_timeout_ms = flow_timeout_ms;

    let engine = Engine::new(
        config,
        EngineDeps {
            bus,
            checkpoints: checkpoints.clone(),
            dedup: dedup.clone(),
            results: results.clone(),
            timers: Arc::new(TokioTimerService::new(SystemClock)),
            hospital: Arc::new(DefaultHospital::new(3)),
        },
        registry(),
        operations,
        SystemClock,
    );
    engine.start();
    TestNode {
        engine,
        checkpoints,
        dedup,
        results,
    }
}

fn two_nodes() -> (TestNode, TestNode) {
    let bus = Arc::new(InMemoryBus::new());
    let a = build_node(bus.clone(), "node-a", None);
    let b = build_node(bus, "node-b", None);
    (a, b)
}

// --- Scenario: happy path two-party flow ---

#[tokio::test]
async fn two_party_flow_completes_on_both_sides() {
    init_logs();
    let (a, _b) = two_nodes();

    let id = a
        .engine
        .start_flow("ping", json!({"peer": "node-b"}), None)
        .unwrap();

    let outcome = a.engine.flow_outcome(id).await.unwrap();
    assert_eq!(outcome, FlowOutcome::OrderlyFinish { result: json!("Y") });

    // Both sides clean up their checkpoints; dedup facts are durable
    assert!(a.checkpoints.get(&id).unwrap().is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(a
        .checkpoints
        .list(None)
        .unwrap()
        .is_empty());
}

// --- Scenario: peer errors mid-flow ---

#[tokio::test]
async fn peer_error_propagates_back_to_the_initiator() {
    let (a, _b) = two_nodes();

    let id = a
        .engine
        .start_flow("ping", json!({"peer": "node-b", "responder": "grumpy"}), None)
        .unwrap();

    match a.engine.flow_outcome(id).await.unwrap() {
        FlowOutcome::ErrorFinish { errors } => {
            assert_eq!(errors.len(), 1);
            match &errors[0].cause {
                ErrorCause::Exception(exception) => {
                    // The exception body crossed its one permitted hop...
                    assert_eq!(exception.message, "nope");
                    // ...and keeps the peer's correlation id
                    assert_eq!(exception.original_error_id, Some(errors[0].error_id));
                }
                other => panic!("expected exception cause, got {other:?}"),
            }
        }
        other => panic!("expected error finish, got {other:?}"),
    }
}

// --- Scenario: crash between send and commit ---

#[tokio::test]
async fn replayed_initiating_message_reaches_the_peer_once() {
    let bus = Arc::new(InMemoryBus::new());
    // node-a is a bare inbox here: we play its engine's part by hand
    let mut a_inbox = bus.register(PartyId::new("node-a"));
    let _b = build_node(bus.clone(), "node-b", None);

    let sender_flow = skein_core::FlowId::fresh();
    let initiator_session = SessionId::fresh();
    let envelope = skein_wire::Envelope {
        sender: PartyId::new("node-a"),
        destination: PartyId::new("node-b"),
        dedup_id: skein_core::DedupId::Message {
            sender: sender_flow,
            seq: 1,
        },
        message: skein_wire::SessionMessage::Initial(skein_wire::InitialSessionMessage {
            initiator_session_id: initiator_session,
            flow_name: "pong".into(),
            app_name: "skein".into(),
            platform_version: 1,
            payload: Some(json!("X")),
        }),
    };

    // The crash-and-replay: the same initiating message is sent twice with
    // the same dedup id
    bus.send(envelope.clone()).await.unwrap();
    bus.send(envelope).await.unwrap();

    // node-b runs exactly one responder, which confirms and answers once
    let mut confirms = 0;
    let mut replies = Vec::new();
    for _ in 0..2 {
        let delivery =
            match tokio::time::timeout(Duration::from_millis(500), a_inbox.recv()).await {
                Ok(Some(delivery)) => delivery,
                _ => break,
            };
        match delivery.envelope.message {
            skein_wire::SessionMessage::Existing(existing) => match existing.payload {
                SessionPayload::Confirm { .. } => confirms += 1,
                SessionPayload::Data { body, .. } => replies.push(body),
                _ => {}
            },
            other => panic!("unexpected message to node-a: {other:?}"),
        }
        bus.ack(&delivery.handler);
    }

    assert_eq!(confirms, 1, "one responder flow, one confirmation");
    assert_eq!(replies, vec![json!("Y")], "peer observed exactly one X");
}

// --- Scenario: stale checkpoint version ---

#[tokio::test]
async fn stale_checkpoint_upsert_is_rejected_and_safe_to_retry() {
    use skein_core::test_support::unstarted_checkpoint;
    use skein_store::{IsolationLevel, StoreError, TxnManager};

    let manager = Arc::new(TxnManager::new(
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(MemoryDedupLog::new()),
        Arc::new(MemoryResultStore::new()),
    ));
    let mut checkpoint = unstarted_checkpoint(skein_core::FlowId::fresh());
    checkpoint.checkpoint_state.num_commits = 7;

    let mut first = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    first.persist_checkpoint(checkpoint.id, &checkpoint).unwrap();
    let mut second = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    second.persist_checkpoint(checkpoint.id, &checkpoint).unwrap();

    first.commit().unwrap();
    // The replayed attempt at version 7 must be rejected...
    let err = second.commit().unwrap_err();
    assert!(matches!(err, StoreError::StaleCheckpoint { .. }));

    // ...and a retry from the committed state succeeds at version 8
    checkpoint.checkpoint_state.num_commits = 8;
    let mut retry = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    retry.persist_checkpoint(checkpoint.id, &checkpoint).unwrap();
    retry.commit().unwrap();
}

// --- Scenario: timed flow timeout ---

#[tokio::test]
async fn timed_flow_retries_from_safe_point_and_completes() {
    let bus = Arc::new(InMemoryBus::new());
    let node = build_node(bus, "node-a", Some(150));

    let id = node.engine.start_flow("timed", json!(null), None).unwrap();

    // First attempt hangs in the notary; the flow timeout forces a retry
    // from the last checkpoint, and the second submission completes.
    let outcome = tokio::time::timeout(Duration::from_secs(5), node.engine.flow_outcome(id))
        .await
        .expect("flow should finish well before the hung first attempt")
        .unwrap();
    assert_eq!(
        outcome,
        FlowOutcome::OrderlyFinish {
            result: json!("notarised")
        }
    );
}

// --- Scenario: client-id retained result ---

#[tokio::test]
async fn client_can_fetch_the_error_outcome_after_removal() {
    let (a, _b) = two_nodes();

    let id = a
        .engine
        .start_flow(
            "ping",
            json!({"peer": "node-b", "responder": "grumpy"}),
            Some(ClientId::new("c1")),
        )
        .unwrap();
    a.engine.flow_outcome(id).await.unwrap();

    // Failed, persisted, and retrievable by the client handle
    let row = a.checkpoints.get(&id).unwrap().unwrap();
    assert_eq!(row.status, skein_core::CheckpointStatus::Failed);
    match a.results.get(&ClientId::new("c1")).unwrap() {
        Some(FlowOutcome::ErrorFinish { errors }) => assert_eq!(errors.len(), 1),
        other => panic!("expected stored error finish, got {other:?}"),
    }
}

// --- Dedup facts are durable once a message is acknowledged ---

#[tokio::test]
async fn acknowledged_messages_leave_durable_dedup_facts() {
    let (a, b) = two_nodes();

    let id = a
        .engine
        .start_flow("ping", json!({"peer": "node-b"}), None)
        .unwrap();
    a.engine.flow_outcome(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The responder durably recorded the initiating message: every send
    // from the initiator carries its flow id and a per-flow sequence, and
    // the initial message is always sequence 1.
    assert!(b
        .dedup
        .contains(&skein_core::DedupId::Message { sender: id, seq: 1 })
        .unwrap());
    // The initiator's own log is untouched by its sends
    assert!(!a
        .dedup
        .contains(&skein_core::DedupId::Message { sender: id, seq: 1 })
        .unwrap());
}

// --- Crash and restart over file-backed stores ---

/// A flow that suspends awaiting a session which only answers after the
/// initiator has crashed and recovered.
#[tokio::test]
async fn crashed_initiator_recovers_from_file_stores_and_completes() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(InMemoryBus::new());

    let checkpoints: Arc<FileCheckpointStore> =
        Arc::new(FileCheckpointStore::open(dir.path().join("checkpoints")).unwrap());
    let dedup: Arc<FileDedupLog> = Arc::new(FileDedupLog::open(dir.path().join("dedup.log")).unwrap());
    let results = Arc::new(MemoryResultStore::new());

    let make_engine = || {
        Engine::new(
            EngineConfig::for_party("node-a"),
            EngineDeps {
                bus: bus.clone(),
                checkpoints: checkpoints.clone(),
                dedup: dedup.clone(),
                results: results.clone(),
                timers: Arc::new(TokioTimerService::new(SystemClock)),
                hospital: Arc::new(DefaultHospital::new(3)),
            },
            registry(),
            OperationRegistry::new(),
            SystemClock,
        )
    };

    // A silent peer so the initiating message has somewhere to land
    let mut b_inbox = bus.register(PartyId::new("node-b"));

    let engine = make_engine();
    engine.start();
    let id = engine
        .start_flow("ping", json!({"peer": "node-b"}), None)
        .unwrap();

    let initial = match tokio::time::timeout(Duration::from_secs(2), b_inbox.recv()).await {
        Ok(Some(delivery)) => delivery,
        _ => panic!("initiating message never arrived"),
    };
    // Let the suspension commit, then crash
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.halt();

    // Restart from the durable stores
    let engine = make_engine();
    engine.start();
    assert_eq!(engine.recover().unwrap(), 1);

    // The peer now confirms and answers; the recovered flow completes.
    let (initiator_session, payload) = match initial.envelope.message {
        skein_wire::SessionMessage::Initial(init) => (init.initiator_session_id, init.payload),
        other => panic!("expected initial message, got {other:?}"),
    };
    assert_eq!(payload, Some(json!("X")));
    bus.ack(&initial.handler);

    let peer_flow = skein_core::FlowId::fresh();
    let peer_session = SessionId::fresh();
    bus.send(skein_wire::Envelope {
        sender: PartyId::new("node-b"),
        destination: PartyId::new("node-a"),
        dedup_id: skein_core::DedupId::Message {
            sender: peer_flow,
            seq: 1,
        },
        message: skein_wire::SessionMessage::Existing(skein_wire::ExistingSessionMessage {
            recipient_session_id: initiator_session,
            payload: SessionPayload::Confirm {
                initiated_session_id: peer_session,
            },
        }),
    })
    .await
    .unwrap();
    bus.send(skein_wire::Envelope {
        sender: PartyId::new("node-b"),
        destination: PartyId::new("node-a"),
        dedup_id: skein_core::DedupId::Message {
            sender: peer_flow,
            seq: 2,
        },
        message: skein_wire::SessionMessage::Existing(skein_wire::ExistingSessionMessage {
            recipient_session_id: initiator_session,
            payload: SessionPayload::Data {
                seq: 1,
                body: json!("Y"),
            },
        }),
    })
    .await
    .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), engine.flow_outcome(id))
        .await
        .expect("recovered flow should complete")
        .unwrap();
    assert_eq!(outcome, FlowOutcome::OrderlyFinish { result: json!("Y") });
}
