// crates/osiris-runtime/src/drivers/tests.rs
// ============================================================================
// Module: Driver Tests
// Description: Unit tests for the builtin drivers and registry.
// Purpose: Validate row flow from inline extraction to CSV artifacts.
// Dependencies: osiris-runtime, tempfile
// ============================================================================

//! ## Overview
//! Runs the builtin drivers against a recording context: the inline
//! extractor yields its configured rows, and the CSV writer renders
//! upstream rows with a sorted header into a step artifact.

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
use std::fs;
use std::path::PathBuf;

use osiris_core::ContextError;
use osiris_core::RunContext;
use osiris_core::StepId;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

use super::DriverRegistry;

/// Minimal context recording metrics and serving a temp artifact root.
struct RecordingContext {
    /// Artifact root.
    root: PathBuf,
    /// Recorded (step, metric, value) triples.
    metrics: Vec<(String, String, Value)>,
}

impl RunContext for RecordingContext {
    fn log_event(
        &mut self,
        _event: &str,
        _fields: BTreeMap<String, Value>,
    ) -> Result<(), ContextError> {
        Ok(())
    }

    fn log_metric(
        &mut self,
        step_id: &StepId,
        metric: &str,
        value: Value,
        _tags: BTreeMap<String, Value>,
    ) -> Result<(), ContextError> {
        self.metrics.push((step_id.as_str().to_string(), metric.to_string(), value));
        Ok(())
    }

    fn artifact_path(&mut self, step_id: &StepId, name: &str) -> Result<PathBuf, ContextError> {
        let dir = self.root.join(step_id.as_str());
        std::fs::create_dir_all(&dir).map_err(|err| ContextError::Io(err.to_string()))?;
        Ok(dir.join(name))
    }

    fn cancelled(&self) -> bool {
        false
    }
}

/// Builds a recording context over a temp directory.
fn context() -> (TempDir, RecordingContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = RecordingContext {
        root: dir.path().to_path_buf(),
        metrics: Vec::new(),
    };
    (dir, ctx)
}

// ============================================================================
// SECTION: Registry
// ============================================================================

#[test]
fn builtins_register_expected_components() {
    let registry = DriverRegistry::with_builtins();
    assert!(registry.get("inline.extractor").is_some());
    assert!(registry.get("csv.writer").is_some());
    assert!(registry.get("mysql.extractor").is_none());
}

// ============================================================================
// SECTION: Inline Extractor
// ============================================================================

#[test]
fn inline_extractor_yields_configured_rows() {
    let (_dir, mut ctx) = context();
    let registry = DriverRegistry::with_builtins();
    let driver = registry.get("inline.extractor").expect("driver");
    let step = StepId::parse("extract").expect("step");
    let config = json!({"rows": [{"id": 1}, {"id": 2}, {"id": 3}]});

    let output = driver.run(&step, &config, &BTreeMap::new(), &mut ctx).expect("run");
    assert_eq!(output.rows, Some(3));
    let rows = output.outputs.get("rows").and_then(Value::as_array).expect("rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(ctx.metrics[0].1, "rows_read");
}

// ============================================================================
// SECTION: CSV Writer
// ============================================================================

#[test]
fn csv_writer_renders_sorted_header_and_rows() {
    let (_dir, mut ctx) = context();
    let registry = DriverRegistry::with_builtins();
    let driver = registry.get("csv.writer").expect("driver");
    let step = StepId::parse("export").expect("step");
    let mut inputs = BTreeMap::new();
    inputs.insert(
        "extract".to_string(),
        json!({"rows": [{"name": "a", "id": 1}, {"name": "b,c", "id": 2}]}),
    );
    let config = json!({"connection": "@fs.local", "path": "out/orders.csv"});

    let output = driver.run(&step, &config, &inputs, &mut ctx).expect("run");
    assert_eq!(output.rows, Some(2));

    let rendered = fs::read_to_string(ctx.root.join("export/orders.csv")).expect("csv");
    let mut lines = rendered.lines();
    assert_eq!(lines.next(), Some("id,name"));
    assert_eq!(lines.next(), Some("1,a"));
    assert_eq!(lines.next(), Some("2,\"b,c\""));
}

#[test]
fn csv_writer_handles_empty_inputs() {
    let (_dir, mut ctx) = context();
    let registry = DriverRegistry::with_builtins();
    let driver = registry.get("csv.writer").expect("driver");
    let step = StepId::parse("export").expect("step");
    let config = json!({"path": "empty.csv"});

    let output = driver.run(&step, &config, &BTreeMap::new(), &mut ctx).expect("run");
    assert_eq!(output.rows, Some(0));
    assert!(ctx.root.join("export/empty.csv").exists());
}
