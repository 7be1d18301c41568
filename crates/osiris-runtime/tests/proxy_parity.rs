// crates/osiris-runtime/tests/proxy_parity.rs
// ============================================================================
// Module: Proxy Parity Tests
// Description: Golden test comparing local and proxy run-log layouts.
// ============================================================================
//! ## Overview
//! Runs the same two-step pipeline through the local adapter and through
//! the transparent-proxy adapter backed by the real worker binary, then
//! compares the resulting run-log directories: same event sequence, same
//! metrics per step, same terminal status, and the same artifact files.

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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use osiris_compiler::Manifest;
use osiris_compiler::manifest::Fingerprints;
use osiris_compiler::manifest::ManifestMeta;
use osiris_compiler::manifest::ManifestMetadata;
use osiris_compiler::manifest::ManifestPipeline;
use osiris_compiler::manifest::ManifestStep;
use osiris_compiler::manifest::ToolchainInfo;
use osiris_config::RunLogPaths;
use osiris_core::RunStatus;
use osiris_core::SessionId;
use osiris_runtime::DriverRegistry;
use osiris_runtime::ExecutionInput;
use osiris_runtime::LocalAdapter;
use osiris_runtime::ProcessSandbox;
use osiris_runtime::ProxyAdapter;
use osiris_runtime::SessionContext;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds the two-step manifest and its cfg files under `build_dir`.
fn build_manifest(build_dir: &Path) -> Manifest {
    let cfg_dir = build_dir.join("cfg");
    fs::create_dir_all(&cfg_dir).expect("cfg dir");
    fs::write(
        cfg_dir.join("extract.json"),
        json!({"rows": [{"id": 1, "sku": "a"}, {"id": 2, "sku": "b"}]}).to_string(),
    )
    .expect("extract cfg");
    fs::write(cfg_dir.join("export.json"), json!({"path": "out/orders.csv"}).to_string())
        .expect("export cfg");
    Manifest {
        meta: ManifestMeta {
            generated_at: "2026-02-01T09:30:00.000Z".to_string(),
            oml_version: "0.1.0".to_string(),
            profile: "dev".to_string(),
            run_id: "${run_id}".to_string(),
            toolchain: ToolchainInfo {
                compiler: "0.1.0".to_string(),
                oml_version: "0.1.0".to_string(),
            },
        },
        pipeline: ManifestPipeline {
            name: "orders_etl".to_string(),
            slug: "orders-etl".to_string(),
            fingerprints: Fingerprints {
                oml_fp: String::new(),
                params_fp: String::new(),
                registry_fp: String::new(),
                compiler_fp: String::new(),
                manifest_fp: "ab".repeat(32),
            },
            steps: vec![
                ManifestStep {
                    id: "extract".to_string(),
                    driver: "inline.extractor".to_string(),
                    mode: "extract".to_string(),
                    cfg_path: "cfg/extract.json".to_string(),
                    needs: vec![],
                },
                ManifestStep {
                    id: "export".to_string(),
                    driver: "csv.writer".to_string(),
                    mode: "write".to_string(),
                    cfg_path: "cfg/export.json".to_string(),
                    needs: vec!["extract".to_string()],
                },
            ],
        },
        metadata: ManifestMetadata {
            source_manifest_path: String::new(),
        },
    }
}

/// Builds a session rooted at `root`.
fn session_at(root: PathBuf) -> SessionContext {
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
    SessionContext::create(SessionId::new("run-000001-PARITY-abababa"), paths).expect("session")
}

/// Extracts the comparable shape of an events stream: event name plus the
/// step it refers to (timestamps and sessions intentionally excluded).
fn event_shape(path: &Path) -> Vec<(String, Option<String>)> {
    fs::read_to_string(path)
        .expect("events")
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).expect("event line");
            (
                value["event"].as_str().expect("event").to_string(),
                value.get("step_id").and_then(Value::as_str).map(str::to_string),
            )
        })
        .collect()
}

/// Extracts the comparable shape of a metrics stream.
fn metric_shape(path: &Path) -> Vec<(String, String, Value)> {
    fs::read_to_string(path)
        .expect("metrics")
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).expect("metric line");
            (
                value["step_id"].as_str().expect("step").to_string(),
                value["metric"].as_str().expect("metric").to_string(),
                value["value"].clone(),
            )
        })
        .collect()
}

// ============================================================================
// SECTION: Golden Parity
// ============================================================================

#[test]
fn local_and_proxy_runs_produce_comparable_layouts() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let build_dir = workspace.path().join("build");
    let manifest = build_manifest(&build_dir);

    // Local run.
    let mut local_session = session_at(workspace.path().join("local-run"));
    let registry = DriverRegistry::with_builtins();
    let local = LocalAdapter::new(&registry);
    let local_input = ExecutionInput {
        manifest: &manifest,
        build_dir: &build_dir,
        secret_maps: BTreeMap::new(),
        step_timeouts: BTreeMap::new(),
    };
    let local_result = local.execute(&local_input, &mut local_session).expect("local run");
    assert_eq!(local_result.status, RunStatus::Completed);

    // Proxy run through the real worker binary.
    let mut proxy_session = session_at(workspace.path().join("proxy-run"));
    let sandbox = ProcessSandbox::new(PathBuf::from(env!("CARGO_BIN_EXE_osiris-proxy-worker")));
    let proxy = ProxyAdapter::new(&sandbox);
    let proxy_input = ExecutionInput {
        manifest: &manifest,
        build_dir: &build_dir,
        secret_maps: BTreeMap::new(),
        step_timeouts: BTreeMap::new(),
    };
    let proxy_result = proxy.execute(&proxy_input, &mut proxy_session).expect("proxy run");
    assert_eq!(proxy_result.status, RunStatus::Completed);
    assert_eq!(proxy_result.totals.rows, local_result.totals.rows);

    // Streams carry the same step framing.
    let local_events = event_shape(&local_session.paths().events);
    let proxy_events = event_shape(&proxy_session.paths().events);
    assert_eq!(local_events, proxy_events);

    // Metrics agree per step and name.
    let local_metrics = metric_shape(&local_session.paths().metrics);
    let mut proxy_metrics = metric_shape(&proxy_session.paths().metrics);
    // duration_ms values legitimately differ across processes.
    let normalize = |metrics: &mut Vec<(String, String, Value)>| {
        for entry in metrics.iter_mut() {
            if entry.1 == "duration_ms" {
                entry.2 = json!(0);
            }
        }
    };
    let mut local_metrics = local_metrics;
    normalize(&mut local_metrics);
    normalize(&mut proxy_metrics);
    assert_eq!(local_metrics, proxy_metrics);

    // Identical artifact files.
    let local_csv =
        fs::read_to_string(local_session.paths().artifacts_dir.join("export/orders.csv"))
            .expect("local csv");
    let proxy_csv =
        fs::read_to_string(proxy_session.paths().artifacts_dir.join("export/orders.csv"))
            .expect("proxy csv");
    assert_eq!(local_csv, proxy_csv);

    // Identical terminal status documents modulo timestamps.
    let read_status = |session: &SessionContext| -> Value {
        serde_json::from_str(&fs::read_to_string(&session.paths().status).expect("status"))
            .expect("status json")
    };
    let mut local_status = read_status(&local_session);
    let mut proxy_status = read_status(&proxy_session);
    for doc in [&mut local_status, &mut proxy_status] {
        doc["started_at"] = json!("");
        doc["ended_at"] = json!("");
        doc["totals"]["duration_ms"] = json!(0);
    }
    assert_eq!(local_status, proxy_status);
}
