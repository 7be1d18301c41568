// crates/osiris-registry/src/validate/tests.rs
// ============================================================================
// Module: Spec Validation Tests
// Description: Unit tests for the three validation levels.
// Purpose: Validate level layering and semantic pointer checks.
// Dependencies: osiris-registry
// ============================================================================

//! ## Overview
//! Validates meta-schema rejections, example validation at the enhanced
//! level, and strict secret-pointer and alias checks including the
//! allow-listed common prefixes.

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

use serde_json::Value;
use serde_json::json;

use super::ValidationLevel;
use super::validate_spec_value;

/// Returns a well-formed spec document for tests.
fn sample_spec() -> Value {
    json!({
        "name": "mysql.extractor",
        "version": "1.0.0",
        "modes": ["extract", "discover"],
        "configSchema": {
            "type": "object",
            "required": ["connection", "table"],
            "properties": {
                "connection": {"type": "string"},
                "table": {"type": "string"},
                "password": {"type": "string"}
            }
        },
        "secrets": ["/password"],
        "examples": [
            {"title": "basic", "config": {"connection": "@mysql.default", "table": "orders"}}
        ],
        "llmHints": {"inputAliases": {"table": ["table_name", "tbl"]}}
    })
}

// ============================================================================
// SECTION: Basic Level
// ============================================================================

#[test]
fn basic_accepts_sample_spec() {
    assert!(validate_spec_value(&sample_spec(), ValidationLevel::Basic).is_empty());
}

#[test]
fn basic_rejects_missing_required_keys() {
    let spec = json!({"name": "mysql.extractor"});
    let issues = validate_spec_value(&spec, ValidationLevel::Basic);
    assert!(!issues.is_empty());
    assert!(issues.iter().all(|issue| issue.level == "basic"));
}

#[test]
fn basic_rejects_single_segment_name() {
    let mut spec = sample_spec();
    spec["name"] = json!("mysql");
    assert!(!validate_spec_value(&spec, ValidationLevel::Basic).is_empty());
}

#[test]
fn basic_rejects_unknown_mode() {
    let mut spec = sample_spec();
    spec["modes"] = json!(["extract", "teleport"]);
    assert!(!validate_spec_value(&spec, ValidationLevel::Basic).is_empty());
}

// ============================================================================
// SECTION: Enhanced Level
// ============================================================================

#[test]
fn enhanced_accepts_sample_spec() {
    assert!(validate_spec_value(&sample_spec(), ValidationLevel::Enhanced).is_empty());
}

#[test]
fn enhanced_rejects_example_violating_schema() {
    let mut spec = sample_spec();
    spec["examples"] = json!([{"config": {"connection": "@mysql.default"}}]);
    let issues = validate_spec_value(&spec, ValidationLevel::Enhanced);
    assert!(issues.iter().any(|issue| issue.level == "enhanced"));
}

#[test]
fn enhanced_rejects_malformed_config_schema() {
    let mut spec = sample_spec();
    spec["configSchema"] = json!({"type": "not-a-type"});
    let issues = validate_spec_value(&spec, ValidationLevel::Enhanced);
    assert!(issues.iter().any(|issue| issue.pointer == "/configSchema"));
}

// ============================================================================
// SECTION: Strict Level
// ============================================================================

#[test]
fn strict_accepts_sample_spec() {
    assert!(validate_spec_value(&sample_spec(), ValidationLevel::Strict).is_empty());
}

#[test]
fn strict_rejects_unresolvable_secret_pointer() {
    let mut spec = sample_spec();
    spec["secrets"] = json!(["/nonexistent"]);
    let issues = validate_spec_value(&spec, ValidationLevel::Strict);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].pointer, "/secrets/0");
}

#[test]
fn strict_accepts_allowlisted_prefixes() {
    let mut spec = sample_spec();
    spec["secrets"] = json!(["/auth/token", "/credentials", "/connection/password"]);
    assert!(validate_spec_value(&spec, ValidationLevel::Strict).is_empty());
}

#[test]
fn strict_rejects_alias_for_unknown_property() {
    let mut spec = sample_spec();
    spec["llmHints"] = json!({"inputAliases": {"mystery": ["m"]}});
    let issues = validate_spec_value(&spec, ValidationLevel::Strict);
    assert_eq!(issues.len(), 1);
    assert!(issues[0].pointer.contains("mystery"));
}
