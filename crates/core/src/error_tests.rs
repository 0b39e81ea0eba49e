// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn locally_raised_exception_is_first_hop() {
    let exc = FlowException::new("nope");
    assert!(exc.first_hop());
}

#[test]
fn received_exception_is_not_first_hop() {
    let id = ErrorId(42);
    let exc = FlowException::received("nope", id);
    assert!(!exc.first_hop());
    assert_eq!(exc.original_error_id, Some(id));
}

#[test]
fn from_peer_with_payload_surfaces_the_exception() {
    let id = ErrorId(7);
    let err = FlowError::from_peer(id, Some(FlowException::new("nope")));
    assert_eq!(err.error_id, id);
    match err.cause {
        ErrorCause::Exception(exc) => {
            assert_eq!(exc.message, "nope");
            assert_eq!(exc.original_error_id, Some(id));
        }
        other => panic!("expected exception cause, got {other:?}"),
    }
}

#[test]
fn from_peer_without_payload_is_generic() {
    let id = ErrorId(7);
    let err = FlowError::from_peer(id, None);
    assert_eq!(err.cause, ErrorCause::Peer { error_id: id });
}

#[parameterized(
    internal = { ErrorCause::Internal { message: "db down".into() }, true },
    hospitalize = { ErrorCause::Hospitalize { message: "stuck".into() }, true },
    exception = { ErrorCause::Exception(FlowException::new("nope")), false },
    session_ended = { ErrorCause::SessionEnded { session_id: SessionId::new(1) }, false },
    timeout = { ErrorCause::Timeout, false },
)]
fn hospital_routing(cause: ErrorCause, expected: bool) {
    assert_eq!(cause.needs_hospital(), expected);
}

#[test]
fn flow_error_serde_round_trip() {
    let err = FlowError::fresh(ErrorCause::Exception(FlowException::new("boom")));
    let json = serde_json::to_string(&err).unwrap();
    let back: FlowError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}
