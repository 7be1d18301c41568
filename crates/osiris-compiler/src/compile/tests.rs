// crates/osiris-compiler/src/compile/tests.rs
// ============================================================================
// Module: Compiler Tests
// Description: Unit tests for param substitution and error classification.
// Purpose: Validate substitution rules and issue-to-error mapping.
// Dependencies: osiris-compiler
// ============================================================================

//! ## Overview
//! Covers `${params.*}` substitution (including pass-through of non-param
//! placeholders) and the classification of validation issues into compile
//! error variants. Full-directory compilation is covered by the
//! integration tests in `tests/compile_artifacts.rs`.

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

use std::collections::BTreeMap;

use super::CompileError;
use super::substitute_text;

/// Returns a params map with one entry.
fn params(name: &str, value: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert(name.to_string(), value.to_string());
    map
}

// ============================================================================
// SECTION: Param Substitution
// ============================================================================

#[test]
fn substitution_replaces_param_spans() {
    let result = substitute_text("table_${params.suffix}", &params("suffix", "2026"), "extract")
        .expect("substitute");
    assert_eq!(result, Some("table_2026".to_string()));
}

#[test]
fn substitution_leaves_plain_text_untouched() {
    let result = substitute_text("orders", &params("suffix", "2026"), "extract").expect("ok");
    assert_eq!(result, None);
}

#[test]
fn substitution_passes_env_placeholders_through() {
    let result =
        substitute_text("${MYSQL_PASSWORD}", &params("suffix", "2026"), "extract").expect("ok");
    assert_eq!(result, None);
}

#[test]
fn substitution_fails_on_missing_param() {
    let err = substitute_text("${params.absent}", &BTreeMap::new(), "extract")
        .expect_err("expected unresolved param");
    assert!(matches!(
        err,
        CompileError::UnresolvedParam { step, name } if step == "extract" && name == "absent"
    ));
}

#[test]
fn substitution_handles_multiple_spans() {
    let mut map = BTreeMap::new();
    map.insert("a".to_string(), "1".to_string());
    map.insert("b".to_string(), "2".to_string());
    let result =
        substitute_text("${params.a}-${params.b}", &map, "extract").expect("substitute");
    assert_eq!(result, Some("1-2".to_string()));
}
