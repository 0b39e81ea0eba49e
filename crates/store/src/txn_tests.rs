// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::checkpoint_store::MemoryCheckpointStore;
use crate::dedup_log::MemoryDedupLog;
use crate::results::MemoryResultStore;
use skein_core::test_support::unstarted_checkpoint;
use skein_core::SessionId;

fn manager() -> Arc<TxnManager> {
    Arc::new(TxnManager::new(
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(MemoryDedupLog::new()),
        Arc::new(MemoryResultStore::new()),
    ))
}

fn fact(seq: u64) -> DedupId {
    DedupId::Message {
        sender: FlowId::fresh(),
        seq,
    }
}

#[test]
fn nothing_is_applied_before_commit() {
    let manager = manager();
    let cp = unstarted_checkpoint(FlowId::fresh());

    let mut txn = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    txn.persist_checkpoint(cp.id, &cp).unwrap();
    txn.insert_dedup_facts(vec![fact(1)]).unwrap();

    assert!(manager.checkpoints().get(&cp.id).unwrap().is_none());

    txn.commit().unwrap();

    assert!(manager.checkpoints().get(&cp.id).unwrap().is_some());
}

#[test]
fn rollback_discards_buffered_writes() {
    let manager = manager();
    let cp = unstarted_checkpoint(FlowId::fresh());

    let mut txn = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    txn.persist_checkpoint(cp.id, &cp).unwrap();
    txn.rollback();

    assert!(manager.checkpoints().get(&cp.id).unwrap().is_none());
}

#[test]
fn dropped_transaction_rolls_back() {
    let manager = manager();
    let cp = unstarted_checkpoint(FlowId::fresh());

    {
        let mut txn = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
        txn.persist_checkpoint(cp.id, &cp).unwrap();
        // dropped without commit
    }

    assert!(manager.checkpoints().get(&cp.id).unwrap().is_none());
}

#[test]
fn checkpoint_and_dedup_facts_commit_together() {
    let manager = manager();
    let cp = unstarted_checkpoint(FlowId::fresh());
    let f = fact(1);

    let mut txn = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    txn.persist_checkpoint(cp.id, &cp).unwrap();
    txn.insert_dedup_facts(vec![f.clone()]).unwrap();
    txn.commit().unwrap();

    assert!(manager.dedup().contains(&f).unwrap());
}

#[test]
fn stale_upsert_is_rejected_eagerly() {
    let manager = manager();
    let mut cp = unstarted_checkpoint(FlowId::fresh());
    cp.checkpoint_state.num_commits = 7;

    let mut txn = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    txn.persist_checkpoint(cp.id, &cp).unwrap();
    txn.commit().unwrap();

    // A second attempt at the same version fails when buffered
    let mut txn = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    let err = txn.persist_checkpoint(cp.id, &cp).unwrap_err();
    assert!(matches!(err, StoreError::StaleCheckpoint { .. }));
}

#[test]
fn stale_upsert_is_rejected_at_commit() {
    let manager = manager();
    let mut cp = unstarted_checkpoint(FlowId::fresh());
    cp.checkpoint_state.num_commits = 7;

    // Two transactions race to commit version 7
    let mut first = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    first.persist_checkpoint(cp.id, &cp).unwrap();
    let mut second = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    second.persist_checkpoint(cp.id, &cp).unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(matches!(err, StoreError::StaleCheckpoint { .. }));
}

#[test]
fn live_registry_tracks_open_transactions() {
    let manager = manager();
    let flow = FlowId::fresh();

    let mut txn = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    txn.track(flow);
    assert_eq!(manager.live_txn(&flow), Some(txn.id()));

    txn.commit().unwrap();
    assert_eq!(manager.live_txn(&flow), None);
}

#[test]
fn record_result_commits_with_the_batch() {
    let manager = manager();
    let client = ClientId::new("c1");
    let outcome = FlowOutcome::OrderlyFinish {
        result: serde_json::json!("done"),
    };

    let mut txn = TxnManager::begin(&manager, IsolationLevel::ReadCommitted);
    txn.record_result(client.clone(), outcome.clone()).unwrap();
    txn.insert_dedup_facts(vec![DedupId::Error {
        error_id: skein_core::ErrorId(1),
        source_session: SessionId::new(1),
    }])
    .unwrap();
    txn.commit().unwrap();

    assert_eq!(manager.results().get(&client).unwrap(), Some(outcome));
}
