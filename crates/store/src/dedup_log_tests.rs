// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use skein_core::{ErrorId, FlowId, SessionId};
use tempfile::tempdir;

fn message_fact(seq: u64) -> DedupId {
    DedupId::Message {
        sender: FlowId::fresh(),
        seq,
    }
}

#[test]
fn memory_insert_reports_new_facts() {
    let log = MemoryDedupLog::new();
    let a = message_fact(1);
    let b = message_fact(2);

    assert_eq!(log.insert_all(&[a.clone(), b.clone()]).unwrap(), 2);
    assert!(log.contains(&a).unwrap());

    // Conflict is not an error, just not new
    assert_eq!(log.insert_all(&[a, b]).unwrap(), 0);
}

#[test]
fn file_log_replays_on_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dedup.log");
    let fact = DedupId::Error {
        error_id: ErrorId(42),
        source_session: SessionId::new(3),
    };

    {
        let log = FileDedupLog::open(&path).unwrap();
        assert_eq!(log.insert_all(std::slice::from_ref(&fact)).unwrap(), 1);
    }

    let log = FileDedupLog::open(&path).unwrap();
    assert!(log.contains(&fact).unwrap());
    assert_eq!(log.insert_all(&[fact]).unwrap(), 0);
}

#[test]
fn file_log_appends_one_line_per_fact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dedup.log");
    let log = FileDedupLog::open(&path).unwrap();

    log.insert_all(&[message_fact(1), message_fact(2)]).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 2);
}

#[test]
fn duplicate_within_one_batch_is_written_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dedup.log");
    let log = FileDedupLog::open(&path).unwrap();

    let fact = message_fact(1);
    log.insert_all(&[fact.clone(), fact]).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
}
