// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builders shared by other crates' tests.

use crate::checkpoint::{Checkpoint, FlowOrigin, InvocationContext};
use crate::id::{ClientId, FlowId, PartyId, SessionId};
use chrono::DateTime;

/// Client-originated invocation context with a fixed timestamp.
pub fn client_invocation(flow_name: &str, client_id: Option<&str>) -> InvocationContext {
    InvocationContext {
        origin: FlowOrigin::Client {
            client_id: client_id.map(ClientId::from),
        },
        flow_name: flow_name.to_string(),
        args: serde_json::Value::Null,
        started_at: DateTime::from_timestamp_millis(1_000_000).unwrap_or(DateTime::UNIX_EPOCH),
    }
}

/// Peer-originated invocation context with a fixed timestamp.
pub fn peer_invocation(flow_name: &str, party: &str, initiator: SessionId) -> InvocationContext {
    InvocationContext {
        origin: FlowOrigin::Peer {
            party: PartyId::new(party),
            initiator_session_id: initiator,
        },
        flow_name: flow_name.to_string(),
        args: serde_json::Value::Null,
        started_at: DateTime::from_timestamp_millis(1_000_000).unwrap_or(DateTime::UNIX_EPOCH),
    }
}

/// Fresh unstarted checkpoint for a client-started flow.
pub fn unstarted_checkpoint(id: FlowId) -> Checkpoint {
    Checkpoint::unstarted(id, client_invocation("ping", None))
}
