// crates/osiris-config/src/config/tests.rs
// ============================================================================
// Module: Configuration Tests
// Description: Unit tests for config defaults, validation, and overrides.
// Purpose: Validate fail-closed behavior and precedence rules.
// Dependencies: osiris-config
// ============================================================================

//! ## Overview
//! Validates built-in defaults, validation rejections (relative base path,
//! unknown template tokens, unsupported enum labels), environment override
//! precedence, and profile resolution.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::AnnexCompression;
use super::FilesystemConfig;
use super::ConfigError;
use super::OsirisConfig;
use super::RunIdFormat;

/// Returns a minimal valid configuration for tests.
fn sample_config() -> OsirisConfig {
    let config = OsirisConfig {
        filesystem: FilesystemConfig {
            base_path: "/workspace/project".to_string(),
            ..FilesystemConfig::default()
        },
        ..OsirisConfig::default()
    };
    config
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

#[test]
fn defaults_follow_contract() {
    let config = OsirisConfig::default();
    assert_eq!(config.filesystem.naming.manifest_short_len, 7);
    assert_eq!(config.filesystem.naming.run_ts_format, "iso_basic_z");
    assert_eq!(config.filesystem.index_dir, ".osiris/index");
    assert_eq!(config.ids.resolve_run_id_format(), RunIdFormat::Incremental);
    assert_eq!(config.aiop.max_core_bytes, 300_000);
    assert!(config.aiop.enabled);
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn validation_rejects_relative_base_path() {
    let mut config = sample_config();
    config.filesystem.base_path = "relative/path".to_string();
    assert!(matches!(config.validate(), Err(ConfigError::BasePath(_))));
}

#[test]
fn validation_rejects_unknown_template_token() {
    let mut config = sample_config();
    config.filesystem.naming.run_dir_template = "{run_ts}_{bogus}".to_string();
    let err = config.validate().expect_err("expected token rejection");
    assert!(matches!(err, ConfigError::UnknownToken { token, .. } if token == "bogus"));
}

#[test]
fn validation_rejects_default_profile_outside_values() {
    let mut config = sample_config();
    config.filesystem.profiles.default = "staging".to_string();
    assert!(matches!(config.validate(), Err(ConfigError::DefaultProfileNotListed { .. })));
}

#[test]
fn validation_rejects_zstd_annex_compression() {
    let mut config = sample_config();
    config.aiop.annex.compress = AnnexCompression::Zstd;
    let err = config.validate().expect_err("expected unsupported codec");
    assert!(matches!(err, ConfigError::Unsupported { field, .. } if field == "aiop.annex.compress"));
}

#[test]
fn validation_rejects_unknown_hash_algo() {
    let mut config = sample_config();
    config.ids.manifest_hash_algo = "md5".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn validation_accepts_sample_config() {
    assert!(sample_config().validate().is_ok());
}

// ============================================================================
// SECTION: Env Overrides
// ============================================================================

#[test]
fn env_overrides_apply_recognized_variables() {
    let mut config = sample_config();
    config.apply_env_overrides(&|name| match name {
        "OSIRIS_AIOP_MAX_CORE_BYTES" => Some("1024".to_string()),
        "OSIRIS_AIOP_ANNEX_ENABLED" => Some("true".to_string()),
        _ => None,
    });
    assert_eq!(config.aiop.max_core_bytes, 1024);
    assert!(config.aiop.annex.enabled);
}

#[test]
fn env_overrides_ignore_malformed_values() {
    let mut config = sample_config();
    config.apply_env_overrides(&|name| {
        (name == "OSIRIS_AIOP_MAX_CORE_BYTES").then(|| "not-a-number".to_string())
    });
    assert_eq!(config.aiop.max_core_bytes, 300_000);
}

// ============================================================================
// SECTION: Profile Resolution
// ============================================================================

#[test]
fn profile_resolution_prefers_explicit_value() {
    let config = sample_config();
    let profile = config.resolve_profile(Some("prod")).expect("profile");
    assert_eq!(profile.as_str(), "prod");
}

#[test]
fn profile_resolution_falls_back_to_default() {
    let config = sample_config();
    let profile = config.resolve_profile(None).expect("profile");
    assert_eq!(profile.as_str(), "dev");
}

#[test]
fn profile_resolution_rejects_unlisted_values() {
    let config = sample_config();
    assert!(config.resolve_profile(Some("staging")).is_err());
}
