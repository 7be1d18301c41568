// crates/osiris-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Tests
// Description: Integration tests for loading osiris.yaml from disk.
// ============================================================================
//! ## Overview
//! Validates YAML loading, size caps, and that a written default config
//! round-trips through load and validation.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::fs;

use osiris_config::FilesystemConfig;
use osiris_config::OsirisConfig;

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn load_parses_minimal_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("osiris.yaml");
    let base = dir.path().display().to_string();
    fs::write(
        &path,
        format!("filesystem:\n  base_path: {base}\n  profiles:\n    default: prod\n"),
    )
    .expect("write");
    let config = OsirisConfig::load(&path).expect("load");
    assert_eq!(config.filesystem.base_path, base);
    assert_eq!(config.filesystem.profiles.default, "prod");
    assert_eq!(config.filesystem.build_dir, "build");
}

#[test]
fn load_rejects_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(OsirisConfig::load(&dir.path().join("absent.yaml")).is_err());
}

#[test]
fn load_rejects_invalid_yaml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("osiris.yaml");
    fs::write(&path, "filesystem: [not, a, map").expect("write");
    assert!(OsirisConfig::load(&path).is_err());
}

#[test]
fn serialized_default_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("osiris.yaml");
    let config = OsirisConfig {
        filesystem: FilesystemConfig {
            base_path: dir.path().display().to_string(),
            ..FilesystemConfig::default()
        },
        ..OsirisConfig::default()
    };
    let rendered = serde_yaml::to_string(&config).expect("render");
    fs::write(&path, rendered).expect("write");
    let reloaded = OsirisConfig::load(&path).expect("load");
    assert_eq!(reloaded, config);
}
