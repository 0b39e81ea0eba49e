// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed checkpoint store: one JSON record per flow, written
//! atomically via tmp + rename, with a content hash checked on reload.

use crate::checkpoint_store::CheckpointStore;
use crate::error::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use skein_core::{Checkpoint, CheckpointStatus, FlowId};
use std::fs;
use std::path::{Path, PathBuf};

/// Current record schema version
const RECORD_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    #[serde(rename = "v")]
    version: u32,
    num_commits: u64,
    /// Hex sha256 of the serialized checkpoint, verified on load.
    content_hash: String,
    checkpoint: Checkpoint,
}

/// One flow per `<uuid>.json` file under the store directory.
pub struct FileCheckpointStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles across threads
    write_lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, id: &FlowId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_uuid().simple()))
    }

    fn content_hash(checkpoint: &Checkpoint) -> Result<String, StoreError> {
        let canonical = serde_json::to_string(checkpoint)?;
        Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
    }

    fn load(&self, path: &Path, id: &FlowId) -> Result<Option<CheckpointRecord>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CheckpointRecord = serde_json::from_slice(&bytes)?;
        let hash = Self::content_hash(&record.checkpoint)?;
        if hash != record.content_hash {
            return Err(StoreError::Corrupt {
                id: *id,
                detail: "content hash mismatch".into(),
            });
        }
        Ok(Some(record))
    }

    fn write_atomic(&self, path: &Path, record: &CheckpointRecord) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(record)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn get(&self, id: &FlowId) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.load(&self.path_for(id), id)?.map(|r| r.checkpoint))
    }

    fn upsert(
        &self,
        id: FlowId,
        num_commits: u64,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(&id);
        if let Some(existing) = self.load(&path, &id)? {
            if num_commits <= existing.num_commits {
                return Err(StoreError::StaleCheckpoint {
                    id,
                    stored: existing.num_commits,
                    supplied: num_commits,
                });
            }
        }
        let record = CheckpointRecord {
            version: RECORD_VERSION,
            num_commits,
            content_hash: Self::content_hash(checkpoint)?,
            checkpoint: checkpoint.clone(),
        };
        self.write_atomic(&path, &record)
    }

    fn remove(&self, id: &FlowId, _may_have_results: bool) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn update_status(&self, id: &FlowId, status: CheckpointStatus) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(id);
        let mut record = self.load(&path, id)?.ok_or(StoreError::NotFound(*id))?;
        record.checkpoint.status = status;
        record.content_hash = Self::content_hash(&record.checkpoint)?;
        self.write_atomic(&path, &record)
    }

    fn list(
        &self,
        filter: Option<CheckpointStatus>,
    ) -> Result<Vec<(FlowId, CheckpointStatus)>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            let record: CheckpointRecord = serde_json::from_slice(&bytes)?;
            let status = record.checkpoint.status;
            if filter.is_none_or(|f| status == f) {
                out.push((record.checkpoint.id, status));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
