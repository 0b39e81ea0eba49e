// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable deduplication log.
//!
//! Every inbound message's dedup id lands here in the same transaction as
//! the checkpoint that consumed it. A conflicting insert means the message
//! was already delivered — that is a no-op, not an error.

use crate::error::StoreError;
use parking_lot::Mutex;
use skein_core::DedupId;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Append-only record of processed inbound messages.
pub trait DedupLog: Send + Sync {
    /// Atomically insert all facts. Returns how many were new.
    fn insert_all(&self, facts: &[DedupId]) -> Result<usize, StoreError>;

    fn contains(&self, fact: &DedupId) -> Result<bool, StoreError>;
}

/// In-memory dedup log.
#[derive(Default)]
pub struct MemoryDedupLog {
    seen: Mutex<HashSet<DedupId>>,
}

impl MemoryDedupLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupLog for MemoryDedupLog {
    fn insert_all(&self, facts: &[DedupId]) -> Result<usize, StoreError> {
        let mut seen = self.seen.lock();
        Ok(facts.iter().filter(|f| seen.insert((*f).clone())).count())
    }

    fn contains(&self, fact: &DedupId) -> Result<bool, StoreError> {
        Ok(self.seen.lock().contains(fact))
    }
}

/// File-backed dedup log: JSON lines appended to a single file, replayed
/// into a set on open.
pub struct FileDedupLog {
    path: PathBuf,
    inner: Mutex<FileDedupInner>,
}

struct FileDedupInner {
    seen: HashSet<DedupId>,
    file: File,
}

impl FileDedupLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut seen = HashSet::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                let fact: DedupId = serde_json::from_str(&line)?;
                seen.insert(fact);
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(FileDedupInner { seen, file }),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl DedupLog for FileDedupLog {
    fn insert_all(&self, facts: &[DedupId]) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let mut fresh = Vec::new();
        for fact in facts {
            if !inner.seen.contains(fact) && !fresh.contains(fact) {
                fresh.push(fact.clone());
            }
        }
        if fresh.is_empty() {
            return Ok(0);
        }
        let mut buf = Vec::new();
        for fact in &fresh {
            serde_json::to_writer(&mut buf, fact)?;
            buf.push(b'\n');
        }
        inner.file.write_all(&buf)?;
        inner.file.sync_data()?;
        let count = fresh.len();
        for fact in fresh {
            inner.seen.insert(fact);
        }
        Ok(count)
    }

    fn contains(&self, fact: &DedupId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().seen.contains(fact))
    }
}

#[cfg(test)]
#[path = "dedup_log_tests.rs"]
mod tests;
