// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_fill_in_omitted_fields() {
    let config = EngineConfig::from_toml_str("party = \"node-a\"").unwrap();
    assert_eq!(config.party, "node-a");
    assert_eq!(config.app_name, "skein");
    assert_eq!(config.platform_version, 1);
    assert_eq!(config.max_internal_retries, 3);
    assert!(config.flow_timeout_ms.is_none());
}

#[test]
fn explicit_values_override_defaults() {
    let config = EngineConfig::from_toml_str(
        "party = \"node-b\"\nmax_internal_retries = 5\nflow_timeout_ms = 30000\n",
    )
    .unwrap();
    assert_eq!(config.max_internal_retries, 5);
    assert_eq!(config.flow_timeout_ms, Some(30_000));
}

#[test]
fn missing_party_is_an_error() {
    assert!(EngineConfig::from_toml_str("app_name = \"x\"").is_err());
}

#[test]
fn load_reads_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, "party = \"node-a\"\n").unwrap();
    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.party, "node-a");
}
