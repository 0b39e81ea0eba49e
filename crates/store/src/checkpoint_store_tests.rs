// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use skein_core::test_support::unstarted_checkpoint;

#[test]
fn get_missing_returns_none() {
    let store = MemoryCheckpointStore::new();
    assert!(store.get(&FlowId::fresh()).unwrap().is_none());
}

#[test]
fn upsert_then_get_round_trips() {
    let store = MemoryCheckpointStore::new();
    let cp = unstarted_checkpoint(FlowId::fresh());

    store.upsert(cp.id, 0, &cp).unwrap();

    let loaded = store.get(&cp.id).unwrap().unwrap();
    assert_eq!(loaded, cp);
}

#[test]
fn stale_num_commits_is_rejected() {
    let store = MemoryCheckpointStore::new();
    let mut cp = unstarted_checkpoint(FlowId::fresh());
    cp.checkpoint_state.num_commits = 7;
    store.upsert(cp.id, 7, &cp).unwrap();

    // Same version again: rejected
    let err = store.upsert(cp.id, 7, &cp).unwrap_err();
    assert!(matches!(
        err,
        StoreError::StaleCheckpoint {
            stored: 7,
            supplied: 7,
            ..
        }
    ));

    // Lower version: rejected
    let err = store.upsert(cp.id, 3, &cp).unwrap_err();
    assert!(matches!(err, StoreError::StaleCheckpoint { .. }));

    // Strictly greater: accepted
    cp.checkpoint_state.num_commits = 8;
    store.upsert(cp.id, 8, &cp).unwrap();
}

#[test]
fn update_status_preserves_commit_counter() {
    let store = MemoryCheckpointStore::new();
    let mut cp = unstarted_checkpoint(FlowId::fresh());
    cp.checkpoint_state.num_commits = 2;
    store.upsert(cp.id, 2, &cp).unwrap();

    store
        .update_status(&cp.id, CheckpointStatus::Paused)
        .unwrap();

    let loaded = store.get(&cp.id).unwrap().unwrap();
    assert_eq!(loaded.status, CheckpointStatus::Paused);
    assert_eq!(loaded.checkpoint_state.num_commits, 2);
}

#[test]
fn update_status_of_missing_flow_fails() {
    let store = MemoryCheckpointStore::new();
    let err = store
        .update_status(&FlowId::fresh(), CheckpointStatus::Paused)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn list_filters_by_status() {
    let store = MemoryCheckpointStore::new();
    let runnable = unstarted_checkpoint(FlowId::fresh());
    let mut failed = unstarted_checkpoint(FlowId::fresh());
    failed.status = CheckpointStatus::Failed;

    store.upsert(runnable.id, 0, &runnable).unwrap();
    store.upsert(failed.id, 0, &failed).unwrap();

    let all = store.list(None).unwrap();
    assert_eq!(all.len(), 2);

    let only_failed = store.list(Some(CheckpointStatus::Failed)).unwrap();
    assert_eq!(only_failed, vec![(failed.id, CheckpointStatus::Failed)]);
}

#[test]
fn remove_deletes_the_row() {
    let store = MemoryCheckpointStore::new();
    let cp = unstarted_checkpoint(FlowId::fresh());
    store.upsert(cp.id, 0, &cp).unwrap();

    store.remove(&cp.id, false).unwrap();
    assert!(store.get(&cp.id).unwrap().is_none());

    // Removing again is a no-op
    store.remove(&cp.id, false).unwrap();
}
