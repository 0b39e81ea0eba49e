// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow error model: the taxonomy of things that can go wrong inside a
//! flow, and the durable [`FlowError`] record that propagates to peers.

use crate::id::{ErrorId, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-visible, serialisable exception that crosses session boundaries.
///
/// The payload travels on the first hop only: a re-propagated exception
/// keeps its `original_error_id` and peers beyond the first see a generic
/// error carrying just the id.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct FlowException {
    pub message: String,
    /// Set when this exception was received from a peer rather than raised
    /// locally; suppresses the payload on further hops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error_id: Option<ErrorId>,
}

impl FlowException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            original_error_id: None,
        }
    }

    /// An exception as surfaced from a peer's error message.
    pub fn received(message: impl Into<String>, error_id: ErrorId) -> Self {
        Self {
            message: message.into(),
            original_error_id: Some(error_id),
        }
    }

    /// Whether the exception payload may be transmitted to peers.
    pub fn first_hop(&self) -> bool {
        self.original_error_id.is_none()
    }
}

/// What went wrong. Mirrors the engine's error taxonomy: user exceptions
/// propagate with payload, internal faults are hospital business, and the
/// rest are engine-raised conditions surfaced to user code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "cause")]
pub enum ErrorCause {
    /// A user-raised, serialisable flow exception.
    #[serde(rename = "exception")]
    #[error("flow exception: {0}")]
    Exception(FlowException),

    /// A peer errored without sharing the exception body.
    #[serde(rename = "peer")]
    #[error("peer flow errored ({error_id})")]
    Peer { error_id: ErrorId },

    /// Engine, bus or store fault. Never propagated with a payload.
    #[serde(rename = "internal")]
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Forces hospitalisation even from otherwise-recoverable contexts.
    #[serde(rename = "hospitalize")]
    #[error("hospitalize: {message}")]
    Hospitalize { message: String },

    /// The counterparty closed the session while data was still expected.
    #[serde(rename = "session-ended")]
    #[error("session {session_id} ended by counterparty")]
    SessionEnded { session_id: SessionId },

    /// A flow timeout fired before the awaited work completed.
    #[serde(rename = "timeout")]
    #[error("flow timed out")]
    Timeout,

    /// The flow was killed by operator command.
    #[serde(rename = "killed")]
    #[error("flow killed")]
    Killed,
}

impl ErrorCause {
    /// Internal and hospitalize-forcing causes go to the flow hospital
    /// instead of ordinary error propagation.
    pub fn needs_hospital(&self) -> bool {
        matches!(
            self,
            ErrorCause::Internal { .. } | ErrorCause::Hospitalize { .. }
        )
    }
}

/// A durable error record attached to an errored flow.
///
/// `error_id` is globally unique and correlates the error across every peer
/// it propagates to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowError {
    pub error_id: ErrorId,
    pub cause: ErrorCause,
}

impl FlowError {
    /// Wrap a cause with a fresh error id.
    pub fn fresh(cause: ErrorCause) -> Self {
        Self {
            error_id: ErrorId::fresh(),
            cause,
        }
    }

    /// An error as received from a peer: correlated by the peer's id.
    pub fn from_peer(error_id: ErrorId, exception: Option<FlowException>) -> Self {
        let cause = match exception {
            Some(exc) => ErrorCause::Exception(FlowException::received(exc.message, error_id)),
            None => ErrorCause::Peer { error_id },
        };
        Self { error_id, cause }
    }

    pub fn needs_hospital(&self) -> bool {
        self.cause.needs_hospital()
    }

    /// Render this error as a throwable exception that keeps the
    /// correlation id when user code rethrows it across sessions.
    pub fn to_exception(&self) -> FlowException {
        let message = match &self.cause {
            ErrorCause::Exception(exception) => exception.message.clone(),
            other => other.to_string(),
        };
        FlowException {
            message,
            original_error_id: Some(self.error_id),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
