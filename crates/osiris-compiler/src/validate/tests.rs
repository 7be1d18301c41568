// crates/osiris-compiler/src/validate/tests.rs
// ============================================================================
// Module: OML Validator Tests
// Description: Unit tests for structural and semantic OML validation.
// Purpose: Validate stable issue codes, DAG checks, and schema checks.
// Dependencies: osiris-compiler, tempfile
// ============================================================================

//! ## Overview
//! Builds a small component registry on disk and validates OML documents
//! against it, covering issue codes for missing keys, bad step ids, unknown
//! dependencies, cycles, unknown components, unsupported modes, schema
//! violations, and malformed connection references.

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

use std::fs;
use std::path::Path;

use osiris_registry::Registry;
use tempfile::TempDir;

use super::codes;
use super::validate_pipeline;
use crate::oml::OmlDocument;

/// Writes a component spec file under the root.
fn write_spec(root: &Path, name: &str, body: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("component dir");
    fs::write(dir.join("spec.yaml"), body).expect("spec file");
}

/// Builds a registry with the extractor/writer pair used across tests.
fn sample_registry() -> (TempDir, Registry) {
    let root = tempfile::tempdir().expect("tempdir");
    write_spec(
        root.path(),
        "mysql.extractor",
        "name: mysql.extractor\n\
         version: 1.0.0\n\
         modes: [extract]\n\
         configSchema:\n\
           type: object\n\
           required: [connection, table]\n\
           properties:\n\
             connection: {type: string}\n\
             table: {type: string}\n",
    );
    write_spec(
        root.path(),
        "csv.writer",
        "name: csv.writer\n\
         version: 1.0.0\n\
         modes: [write]\n\
         configSchema:\n\
           type: object\n\
           required: [connection, path]\n\
           properties:\n\
             connection: {type: string}\n\
             path: {type: string}\n",
    );
    let registry = Registry::load(root.path()).expect("registry");
    (root, registry)
}

/// Parses the orders pipeline fixture.
fn orders_doc() -> OmlDocument {
    OmlDocument::parse(
        b"oml_version: \"0.1.0\"\n\
          name: orders_etl\n\
          steps:\n\
            - id: extract\n\
              component: mysql.extractor\n\
              mode: extract\n\
              config: {connection: \"@mysql.default\", table: orders}\n\
            - id: export\n\
              component: csv.writer\n\
              mode: write\n\
              depends_on: [extract]\n\
              config: {connection: \"@fs.local\", path: out/orders.csv}\n",
    )
    .expect("oml")
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[test]
fn valid_pipeline_passes_and_orders_steps() {
    let (_root, registry) = sample_registry();
    let pipeline = validate_pipeline(&orders_doc(), &registry).expect("valid");
    assert_eq!(pipeline.slug.as_str(), "orders-etl");
    assert_eq!(pipeline.steps.len(), 2);
    assert_eq!(pipeline.topo_order, vec![0, 1]);
}

// ============================================================================
// SECTION: Structural Issues
// ============================================================================

#[test]
fn empty_steps_reports_missing_required() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps.clear();
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    assert!(issues.iter().any(|issue| issue.id == codes::MISSING_REQUIRED));
}

#[test]
fn bad_step_id_reports_charset_issue() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps[0].id = "Extract!".to_string();
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    assert!(issues.iter().any(|issue| issue.id == codes::BAD_STEP_ID));
}

#[test]
fn duplicate_step_id_is_reported() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps[1].id = "extract".to_string();
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    assert!(issues.iter().any(|issue| issue.id == codes::DUPLICATE_STEP_ID));
}

#[test]
fn unknown_dependency_is_reported_with_path() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps[1].depends_on = vec!["missing".to_string()];
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    let issue = issues.iter().find(|issue| issue.id == codes::UNKNOWN_DEPENDENCY).expect("issue");
    assert_eq!(issue.path, "/steps/1/depends_on/0");
}

#[test]
fn unsupported_version_is_reported() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.oml_version = "9.9.9".to_string();
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    assert!(issues.iter().any(|issue| issue.id == codes::BAD_VERSION));
}

// ============================================================================
// SECTION: Semantic Issues
// ============================================================================

#[test]
fn cycle_reports_cycle_nodes() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps[0].depends_on = vec!["export".to_string()];
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    let issue = issues.iter().find(|issue| issue.id == codes::CYCLE).expect("cycle issue");
    assert!(issue.message.contains("extract"));
    assert!(issue.message.contains("export"));
}

#[test]
fn unknown_component_is_reported() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps[0].component = "oracle.extractor".to_string();
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    assert!(issues.iter().any(|issue| issue.id == codes::UNKNOWN_COMPONENT));
}

#[test]
fn unsupported_mode_is_reported() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps[0].mode = "write".to_string();
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    assert!(issues.iter().any(|issue| issue.id == codes::UNSUPPORTED_MODE));
}

#[test]
fn schema_violation_is_reported_with_pointer() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps[0].config = serde_json::json!({"connection": "@mysql.default"});
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    let issue = issues.iter().find(|issue| issue.id == codes::CONFIG_INVALID).expect("issue");
    assert!(issue.path.starts_with("/steps/0/config"));
}

#[test]
fn malformed_connection_reference_is_reported() {
    let (_root, registry) = sample_registry();
    let mut doc = orders_doc();
    doc.steps[0].config =
        serde_json::json!({"connection": "mysql://root@db", "table": "orders"});
    let issues = validate_pipeline(&doc, &registry).expect_err("issues");
    let issue = issues.iter().find(|issue| issue.id == codes::BAD_CONNECTION).expect("issue");
    assert!(issue.suggest.is_some());
}
