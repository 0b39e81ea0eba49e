// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors that can occur in store operations

use skein_core::FlowId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Optimistic-replace rejection: the supplied commit counter is not
    /// strictly greater than the stored one. The engine treats this as a
    /// replay and rolls back.
    #[error("stale checkpoint for {id}: stored num_commits {stored}, supplied {supplied}")]
    StaleCheckpoint {
        id: FlowId,
        stored: u64,
        supplied: u64,
    },

    #[error("checkpoint not found: {0}")]
    NotFound(FlowId),

    /// A durable record failed its integrity check on reload.
    #[error("corrupt record for {id}: {detail}")]
    Corrupt { id: FlowId, detail: String },
}
