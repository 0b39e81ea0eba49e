// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! skein-store: durable state for the flow engine.
//!
//! Checkpoint store (optimistic replace by commit counter), deduplication
//! log, client result store, scoped transactions, and soft locks. Memory
//! implementations back the test suite; file implementations back a single
//! node's durable state.

mod checkpoint_store;
mod dedup_log;
mod error;
mod file;
mod locks;
mod results;
mod txn;

pub use checkpoint_store::{CheckpointStore, MemoryCheckpointStore};
pub use dedup_log::{DedupLog, FileDedupLog, MemoryDedupLog};
pub use error::StoreError;
pub use file::FileCheckpointStore;
pub use locks::SoftLockRegistry;
pub use results::{MemoryResultStore, ResultStore};
pub use txn::{IsolationLevel, Txn, TxnManager};
