// crates/osiris-aiop/src/leak/tests.rs
// ============================================================================
// Module: Leak Scanner Tests
// Description: Unit tests for the end-of-build secret scan.
// Purpose: Validate findings on denylisted values and raw placeholders.
// Dependencies: osiris-aiop
// ============================================================================

//! ## Overview
//! Validates the scanner over hand-built core documents.

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

use super::scan_core;

// ============================================================================
// SECTION: Scan
// ============================================================================

#[test]
fn clean_core_produces_no_findings() {
    let core = json!({
        "narrative": {"text": "Run completed."},
        "evidence": {"timeline": {"events": []}},
        "metadata": {"password": "***MASKED***"},
    });
    assert!(scan_core(&core).is_empty());
}

#[test]
fn unmasked_denylisted_value_is_reported() {
    let core = json!({"metadata": {"auth_token": "sk-live-123"}});
    let findings = scan_core(&core);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].pointer, "/metadata/auth_token");
}

#[test]
fn raw_placeholder_is_reported() {
    let core = json!({"narrative": {"text": "resolves ${MYSQL_PASSWORD} at runtime"}});
    assert_eq!(scan_core(&core).len(), 1);
}
