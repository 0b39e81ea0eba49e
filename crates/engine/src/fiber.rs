// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fibers: the execution vehicle for user flow logic.
//!
//! User code is written in continuation-passing style: each step returns a
//! [`FlowYield`] carrying session requests, a suspend reason, and a frozen
//! frame that the engine checkpoints. On resume — in this process or after
//! a crash — the engine hands the frame back together with the awaited
//! value. The frame is the flow's whole memory between steps.

use skein_core::{FlowFrame, FlowId, FlowYield, PartyId, ResumeValue, SessionId};
use std::collections::HashMap;
use std::sync::Arc;

/// Ambient facts a flow step may consult. Carried as an argument — flows
/// never read engine state implicitly.
#[derive(Debug, Clone)]
pub struct FlowCtx {
    pub flow_id: FlowId,
    /// The node this flow runs on.
    pub party: PartyId,
    /// For peer-created flows: the session connected back to the
    /// initiator.
    pub initiator_session: Option<SessionId>,
}

impl FlowCtx {
    /// Stable session token for this flow's nth session. Replays of a step
    /// reproduce the same token, which keeps crash recovery convergent.
    pub fn session_token(&self, ordinal: u64) -> SessionId {
        SessionId::derived(&self.flow_id, ordinal)
    }
}

/// A user flow, written as a resumable step function.
pub trait FlowLogic: Send {
    /// First step, fed the start arguments.
    fn on_start(&mut self, args: serde_json::Value, ctx: &FlowCtx) -> FlowYield;

    /// Every later step: the frame frozen at the last suspension plus the
    /// value the flow was waiting for.
    fn on_resume(&mut self, frame: FlowFrame, value: ResumeValue, ctx: &FlowCtx) -> FlowYield;
}

type FlowFactory = Arc<dyn Fn() -> Box<dyn FlowLogic> + Send + Sync>;

/// Named flow constructors. Peer-initiated sessions look their counterparty
/// flow up here.
#[derive(Default, Clone)]
pub struct FlowRegistry {
    factories: HashMap<String, FlowFactory>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn FlowLogic> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn FlowLogic>> {
        self.factories.get(name).map(|f| f())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

#[cfg(test)]
#[path = "fiber_tests.rs"]
mod tests;
