// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message bus abstraction and the in-memory reference implementation.
//!
//! The bus guarantees at-least-once delivery, preserves order per
//! destination, and suppresses sends whose dedup id it has already seen —
//! that is what makes crash-and-resend safe on the sending side. Receive
//! dedup stays the engine's job, via the handler it acks after commit.

use async_trait::async_trait;
use parking_lot::Mutex;
use skein_core::{DedupHandler, PartyId};
use skein_wire::Envelope;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::mpsc;

const INBOX_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("unknown destination: {0}")]
    UnknownDestination(PartyId),

    #[error("inbox closed for {0}")]
    InboxClosed(PartyId),
}

/// One inbound delivery: the envelope plus the handler the engine must
/// acknowledge once the message is durably processed.
#[derive(Debug)]
pub struct Delivery {
    pub envelope: Envelope,
    pub handler: DedupHandler,
}

/// Reliable peer-to-peer message transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish an envelope. Replays carrying an already-seen dedup id are
    /// suppressed silently.
    async fn send(&self, envelope: Envelope) -> Result<(), BusError>;

    /// Attach (or re-attach after a crash) a node's inbox. Unacknowledged
    /// deliveries are replayed into the fresh inbox.
    fn register(&self, party: PartyId) -> mpsc::Receiver<Delivery>;

    /// Confirm a delivery as durably processed.
    fn ack(&self, handler: &DedupHandler);
}

struct NodeInbox {
    tx: mpsc::Sender<Delivery>,
    /// Dedup ids this destination has accepted, ever.
    seen: HashSet<skein_core::DedupId>,
    /// Deliveries not yet acknowledged, by ack token, in delivery order.
    unacked: Vec<(u64, Envelope)>,
}

/// In-process bus connecting engines in one test harness.
#[derive(Default)]
pub struct InMemoryBus {
    nodes: Mutex<HashMap<PartyId, NodeInbox>>,
    next_token: Mutex<u64>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_token(&self) -> u64 {
        let mut token = self.next_token.lock();
        *token += 1;
        *token
    }

    /// Deliveries sitting unacknowledged for a party (test observability).
    pub fn unacked_count(&self, party: &PartyId) -> usize {
        self.nodes
            .lock()
            .get(party)
            .map(|n| n.unacked.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn send(&self, envelope: Envelope) -> Result<(), BusError> {
        let (tx, delivery) = {
            let mut nodes = self.nodes.lock();
            let node = nodes
                .get_mut(&envelope.destination)
                .ok_or_else(|| BusError::UnknownDestination(envelope.destination.clone()))?;

            if node.seen.contains(&envelope.dedup_id) {
                tracing::debug!(
                    dedup_id = %envelope.dedup_id,
                    destination = %envelope.destination,
                    "suppressing duplicate send"
                );
                return Ok(());
            }
            node.seen.insert(envelope.dedup_id.clone());

            let token = self.next_token();
            node.unacked.push((token, envelope.clone()));
            let handler = DedupHandler::new(envelope.dedup_id.clone(), token);
            (node.tx.clone(), Delivery { envelope, handler })
        };

        tx.send(delivery)
            .await
            .map_err(|e| BusError::InboxClosed(e.0.envelope.destination.clone()))
    }

    fn register(&self, party: PartyId) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(INBOX_DEPTH);
        let mut nodes = self.nodes.lock();
        let (seen, replay) = match nodes.remove(&party) {
            Some(previous) => (previous.seen, previous.unacked),
            None => (HashSet::new(), Vec::new()),
        };

        // Replay unacked deliveries into the fresh inbox, original order
        let mut unacked = Vec::new();
        for (token, envelope) in replay {
            let handler = DedupHandler::new(envelope.dedup_id.clone(), token);
            unacked.push((token, envelope.clone()));
            // Inbox is empty here; try_send only fails past INBOX_DEPTH
            // outstanding replays, which indicates a stalled node anyway.
            let _ = tx.try_send(Delivery { envelope, handler });
        }

        nodes.insert(party, NodeInbox { tx, seen, unacked });
        rx
    }

    fn ack(&self, handler: &DedupHandler) {
        let mut nodes = self.nodes.lock();
        for node in nodes.values_mut() {
            node.unacked.retain(|(token, _)| *token != handler.ack_token);
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
