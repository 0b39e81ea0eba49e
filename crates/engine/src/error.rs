// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types

use skein_core::FlowId;
use thiserror::Error;

/// Errors that can occur during action execution
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("store error: {0}")]
    Store(#[from] skein_store::StoreError),

    #[error("bus error: {0}")]
    Bus(#[from] crate::bus::BusError),

    /// A persistence action arrived outside a `CreateTransaction` /
    /// `CommitTransaction` bracket.
    #[error("no open transaction for action {action}")]
    NoOpenTransaction { action: &'static str },

    #[error("transaction already open when executing {action}")]
    TransactionAlreadyOpen { action: &'static str },
}

/// Errors surfaced by the engine API
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] skein_store::StoreError),

    #[error("no flow registered under name '{0}'")]
    UnknownFlowName(String),

    #[error("flow not found: {0}")]
    FlowNotFound(FlowId),

    #[error("flow {0} is no longer accepting events")]
    MailboxClosed(FlowId),

    #[error("config error: {0}")]
    Config(String),
}
