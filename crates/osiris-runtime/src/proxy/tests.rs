// crates/osiris-runtime/src/proxy/tests.rs
// ============================================================================
// Module: Proxy Adapter Tests
// Description: Unit tests for passthrough handling and sandbox failures.
// Purpose: Validate transparent stream writes and error classification.
// Dependencies: osiris-runtime, tempfile
// ============================================================================

//! ## Overview
//! Validates that worker `event`/`metric` messages land in the session
//! streams exactly like locally emitted records, that unknown messages are
//! ignored, and that an unlaunchable sandbox maps to `SandboxUnavailable`.
//! Full host/worker round trips live in `tests/proxy_parity.rs`.

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
use std::process::Child;

use osiris_config::RunLogPaths;
use osiris_core::SessionId;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

use super::ProcessSandbox;
use super::ProxyAdapter;
use super::ProxyError;
use super::Sandbox;
use crate::protocol::WorkerMessage;
use crate::session::SessionContext;

/// Sandbox stub that always fails to launch.
struct BrokenSandbox;

impl Sandbox for BrokenSandbox {
    fn launch(&self) -> Result<Child, ProxyError> {
        Err(ProxyError::SandboxUnavailable("no backend".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Builds a session over a fresh temp run directory.
fn sample_session() -> (TempDir, SessionContext) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("run");
    let paths = RunLogPaths {
        events: root.join("events.jsonl"),
        metrics: root.join("metrics.jsonl"),
        log: root.join("osiris.log"),
        status: root.join("status.json"),
        manifest_copy: root.join("manifest.yaml"),
        artifacts_dir: root.join("artifacts"),
        cfg_dir: root.join("cfg"),
        dir: root,
    };
    let session =
        SessionContext::create(SessionId::new("run-000001-TEST-abababa"), paths).expect("session");
    (dir, session)
}

// ============================================================================
// SECTION: Passthrough
// ============================================================================

#[test]
fn event_messages_pass_through_to_the_stream() {
    let (_dir, mut session) = sample_session();
    let sandbox = BrokenSandbox;
    let adapter = ProxyAdapter::new(&sandbox);
    adapter
        .passthrough(&mut session, WorkerMessage::Event {
            name: "chunk_loaded".to_string(),
            data: json!({"step_id": "extract", "chunk": 4}),
        })
        .expect("passthrough");

    let contents = fs::read_to_string(&session.paths().events).expect("events");
    let parsed: Value = serde_json::from_str(contents.lines().next().expect("line")).expect("json");
    assert_eq!(parsed["event"], json!("chunk_loaded"));
    assert_eq!(parsed["chunk"], json!(4));
    assert_eq!(parsed["session"], json!("run-000001-TEST-abababa"));
}

#[test]
fn metric_messages_pass_through_to_the_stream() {
    let (_dir, mut session) = sample_session();
    let sandbox = BrokenSandbox;
    let adapter = ProxyAdapter::new(&sandbox);
    adapter
        .passthrough(&mut session, WorkerMessage::Metric {
            name: "rows_read".to_string(),
            step_id: "extract".to_string(),
            value: json!(1204),
            tags: json!({}),
        })
        .expect("passthrough");

    let contents = fs::read_to_string(&session.paths().metrics).expect("metrics");
    let parsed: Value = serde_json::from_str(contents.lines().next().expect("line")).expect("json");
    assert_eq!(parsed["metric"], json!("rows_read"));
    assert_eq!(parsed["step_id"], json!("extract"));
}

#[test]
fn unknown_messages_are_ignored() {
    let (_dir, mut session) = sample_session();
    let sandbox = BrokenSandbox;
    let adapter = ProxyAdapter::new(&sandbox);
    adapter.passthrough(&mut session, WorkerMessage::Unknown).expect("passthrough");
    let contents = fs::read_to_string(&session.paths().events).expect("events");
    assert!(contents.is_empty());
}

// ============================================================================
// SECTION: Sandbox Failures
// ============================================================================

#[test]
fn missing_worker_binary_is_sandbox_unavailable() {
    let sandbox = ProcessSandbox::new(PathBuf::from("/nonexistent/osiris-proxy-worker"));
    assert!(matches!(sandbox.launch(), Err(ProxyError::SandboxUnavailable(_))));
    assert_eq!(sandbox.name(), "process");
}

#[test]
fn broken_sandbox_fails_execute_with_sandbox_unavailable() {
    let (_dir, mut session) = sample_session();
    let sandbox = BrokenSandbox;
    let adapter = ProxyAdapter::new(&sandbox);
    let manifest = crate::local::tests_support::empty_manifest();
    let input = crate::local::ExecutionInput {
        manifest: &manifest,
        build_dir: std::path::Path::new("/tmp"),
        secret_maps: BTreeMap::new(),
        step_timeouts: BTreeMap::new(),
    };
    assert!(matches!(
        adapter.execute(&input, &mut session),
        Err(ProxyError::SandboxUnavailable(_))
    ));
}
