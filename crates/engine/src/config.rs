// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for one engine node, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// This node's name on the bus.
    pub party: String,

    /// Application name stamped into session-initiating messages.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Protocol version stamped into session-initiating messages.
    #[serde(default = "default_platform_version")]
    pub platform_version: u32,

    /// Bounded retries for internal errors before the hospital gives up
    /// and starts error propagation.
    #[serde(default = "default_max_internal_retries")]
    pub max_internal_retries: u32,

    /// Transition records retained per flow by the history recorder.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// When set, every flow is timed: the timeout fires a
    /// retry-from-safe-point, not a cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_timeout_ms: Option<u64>,
}

fn default_app_name() -> String {
    "skein".to_string()
}

fn default_platform_version() -> u32 {
    1
}

fn default_max_internal_retries() -> u32 {
    3
}

fn default_history_capacity() -> usize {
    32
}

impl EngineConfig {
    /// Minimal config for the given node name.
    pub fn for_party(party: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            app_name: default_app_name(),
            platform_version: default_platform_version(),
            max_internal_retries: default_max_internal_retries(),
            history_capacity: default_history_capacity(),
            flow_timeout_ms: None,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
