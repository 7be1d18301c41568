// crates/osiris-core/src/core/redaction/tests.rs
// ============================================================================
// Module: Redaction Tests
// Description: Unit tests for pointer masking, denylist, and leak scanning.
// Purpose: Validate that secrets and placeholders never survive redaction.
// Dependencies: osiris-core
// ============================================================================

//! ## Overview
//! Validates the redaction stack end to end: component pointers, the
//! field-name denylist with prefix/suffix expansion, `${VAR}` placeholder
//! masking, and the leak scanner that guards finished documents.

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

use serde_json::json;

use super::LeakKind;
use super::MASK;
use super::SecretMap;
use super::is_denylisted_key;
use super::mask_placeholder_text;
use super::redact_denylist;
use super::redact_payload;
use super::redact_pointers;
use super::scan_for_leaks;

// ============================================================================
// SECTION: Denylist Matching
// ============================================================================

#[test]
fn denylist_matches_exact_prefix_and_suffix() {
    assert!(is_denylisted_key("password"));
    assert!(is_denylisted_key("db_password"));
    assert!(is_denylisted_key("password_hash"));
    assert!(is_denylisted_key("API-KEY"));
    assert!(is_denylisted_key("auth_token"));
    assert!(!is_denylisted_key("table"));
    assert!(!is_denylisted_key("passwordless_flag"));
}

// ============================================================================
// SECTION: Masking
// ============================================================================

#[test]
fn pointer_masking_replaces_targets_only() {
    let mut config = json!({"connection": {"host": "db", "pw": "hunter2"}, "table": "orders"});
    redact_pointers(&mut config, &["/connection/pw"]);
    assert_eq!(config["connection"]["pw"], json!(MASK));
    assert_eq!(config["connection"]["host"], json!("db"));
    assert_eq!(config["table"], json!("orders"));
}

#[test]
fn pointer_masking_ignores_unresolved_pointers() {
    let mut config = json!({"table": "orders"});
    redact_pointers(&mut config, &["/missing/field"]);
    assert_eq!(config, json!({"table": "orders"}));
}

#[test]
fn denylist_masking_collapses_nested_blocks() {
    let mut payload = json!({"auth": {"user": "root", "password": "x"}, "rows": 3});
    redact_denylist(&mut payload);
    assert_eq!(payload["auth"], json!(MASK));
    assert_eq!(payload["rows"], json!(3));
}

#[test]
fn placeholder_masking_covers_every_span() {
    let masked = mask_placeholder_text("user=${DB_USER} pass=${DB_PASS}").expect("masked");
    assert_eq!(masked, format!("user={MASK} pass={MASK}"));
    assert!(mask_placeholder_text("plain text").is_none());
}

#[test]
fn full_stack_masks_component_secrets() {
    let map = SecretMap {
        secrets: vec!["/dsn".to_string()],
        redaction_extras: vec![],
    };
    let mut payload = json!({"dsn": "mysql://root:hunter2@db", "note": "${MYSQL_PASSWORD}"});
    redact_payload(&mut payload, &map);
    assert_eq!(payload["dsn"], json!(MASK));
    assert_eq!(payload["note"], json!(MASK));
}

// ============================================================================
// SECTION: Leak Scanning
// ============================================================================

#[test]
fn scanner_reports_unmasked_denylisted_values() {
    let payload = json!({"connection": {"password": "hunter2"}});
    let findings = scan_for_leaks(&payload);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, LeakKind::DenylistedValue);
    assert_eq!(findings[0].pointer, "/connection/password");
}

#[test]
fn scanner_reports_raw_placeholders() {
    let payload = json!({"note": "uses ${MYSQL_PASSWORD}"});
    let findings = scan_for_leaks(&payload);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].kind, LeakKind::Placeholder);
}

#[test]
fn scanner_accepts_masked_documents() {
    let mut payload = json!({"auth": {"password": "x"}, "note": "${VAR}"});
    redact_denylist(&mut payload);
    super::mask_placeholders(&mut payload);
    assert!(scan_for_leaks(&payload).is_empty());
}
