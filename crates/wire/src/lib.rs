// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session wire protocol for peer-to-peer flow messaging.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod envelope;
mod wire;

pub use envelope::{Envelope, ExistingSessionMessage, InitialSessionMessage, SessionMessage};
pub use wire::{decode, encode, read_message, write_message, ProtocolError};

#[cfg(test)]
mod property_tests;
