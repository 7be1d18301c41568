// crates/osiris-index/src/index/tests.rs
// ============================================================================
// Module: Run Index Tests
// Description: Unit tests for NDJSON appends, listing, and delta lookup.
// Purpose: Validate append-only behavior and previous-completed scanning.
// Dependencies: osiris-index, tempfile
// ============================================================================

//! ## Overview
//! Validates that appends add exactly one parseable line per run to both
//! the global file and the pipeline shard, that listing filters work, and
//! that `find_previous_completed` picks the newest completed run of the
//! same manifest while excluding the current session.

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

use osiris_config::IndexPaths;
use tempfile::TempDir;

use super::RunFilter;
use super::RunIndex;
use super::RunRecord;

/// Builds index paths rooted in a fresh temp directory.
fn sample_index() -> (TempDir, RunIndex) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join(".osiris/index");
    let paths = IndexPaths {
        runs_jsonl: root.join("runs.jsonl"),
        by_pipeline_dir: root.join("by_pipeline"),
        latest_dir: root.join("latest"),
        last_compile: root.join("last_compile.txt"),
        counters_db: root.join("counters.sqlite"),
    };
    (dir, RunIndex::new(paths))
}

/// Returns a completed record fixture.
fn record(run_id: u64, session: &str, status: &str, started_at: &str) -> RunRecord {
    RunRecord {
        run_id,
        session_id: session.to_string(),
        pipeline_slug: "orders-etl".to_string(),
        profile: "dev".to_string(),
        manifest_hash: "ab".repeat(32),
        manifest_short: "abababa".to_string(),
        status: status.to_string(),
        started_at: started_at.to_string(),
        ended_at: started_at.to_string(),
        rows: 1204,
        duration_ms: 850,
        run_logs_path: "/workspace/run_logs/dev/orders-etl/x".to_string(),
        aiop_path: None,
    }
}

// ============================================================================
// SECTION: Appends
// ============================================================================

#[test]
fn append_adds_one_line_to_global_and_shard() {
    let (_dir, index) = sample_index();
    index.append(&record(1, "s1", "completed", "2026-02-01T09:30:00.000Z")).expect("append");
    index.append(&record(2, "s2", "failed", "2026-02-01T09:31:00.000Z")).expect("append");

    let global = fs::read_to_string(&index.paths().runs_jsonl).expect("global");
    assert_eq!(global.lines().count(), 2);
    let shard =
        fs::read_to_string(index.paths().by_pipeline_dir.join("orders-etl.jsonl")).expect("shard");
    assert_eq!(shard.lines().count(), 2);
    for line in global.lines() {
        let parsed: serde_json::Value = serde_json::from_str(line).expect("parseable");
        for key in
            ["run_id", "session_id", "pipeline_slug", "profile", "manifest_hash", "started_at", "ended_at", "status"]
        {
            assert!(parsed.get(key).is_some(), "missing required key {key}");
        }
    }
}

#[test]
fn index_never_shrinks_on_append() {
    let (_dir, index) = sample_index();
    index.append(&record(1, "s1", "completed", "2026-02-01T09:30:00.000Z")).expect("append");
    let before = fs::metadata(&index.paths().runs_jsonl).expect("meta").len();
    index.append(&record(2, "s2", "completed", "2026-02-01T09:31:00.000Z")).expect("append");
    let after = fs::metadata(&index.paths().runs_jsonl).expect("meta").len();
    assert!(after > before);
}

// ============================================================================
// SECTION: Listing & Lookup
// ============================================================================

#[test]
fn list_applies_status_and_pipeline_filters() {
    let (_dir, index) = sample_index();
    index.append(&record(1, "s1", "completed", "2026-02-01T09:30:00.000Z")).expect("append");
    index.append(&record(2, "s2", "failed", "2026-02-01T09:31:00.000Z")).expect("append");

    let completed = index
        .list(&RunFilter {
            status: Some("completed".to_string()),
            ..RunFilter::default()
        })
        .expect("list");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].run_id, 1);

    let other = index
        .list(&RunFilter {
            pipeline: Some("customers-etl".to_string()),
            ..RunFilter::default()
        })
        .expect("list");
    assert!(other.is_empty());
}

#[test]
fn find_locates_by_run_id_or_session_id() {
    let (_dir, index) = sample_index();
    index.append(&record(1, "s1", "completed", "2026-02-01T09:30:00.000Z")).expect("append");
    assert_eq!(index.find("1").expect("find").expect("record").session_id, "s1");
    assert_eq!(index.find("s1").expect("find").expect("record").run_id, 1);
    assert!(index.find("missing").expect("find").is_none());
}

// ============================================================================
// SECTION: Previous Completed Lookup
// ============================================================================

#[test]
fn previous_completed_picks_newest_matching_run() {
    let (_dir, index) = sample_index();
    index.append(&record(1, "s1", "completed", "2026-02-01T09:30:00.000Z")).expect("append");
    index.append(&record(2, "s2", "completed", "2026-02-01T10:30:00.000Z")).expect("append");
    index.append(&record(3, "s3", "failed", "2026-02-01T11:30:00.000Z")).expect("append");

    let hash = "ab".repeat(32);
    let previous = index
        .find_previous_completed("orders-etl", &hash, "s4")
        .expect("lookup")
        .expect("record");
    assert_eq!(previous.session_id, "s2");
}

#[test]
fn previous_completed_excludes_current_session() {
    let (_dir, index) = sample_index();
    index.append(&record(1, "s1", "completed", "2026-02-01T09:30:00.000Z")).expect("append");
    let hash = "ab".repeat(32);
    assert!(
        index
            .find_previous_completed("orders-etl", &hash, "s1")
            .expect("lookup")
            .is_none()
    );
}

#[test]
fn previous_completed_accepts_legacy_success_label() {
    let (_dir, index) = sample_index();
    index.append(&record(1, "s1", "success", "2026-02-01T09:30:00.000Z")).expect("append");
    let hash = "ab".repeat(32);
    let previous = index
        .find_previous_completed("orders-etl", &hash, "s9")
        .expect("lookup")
        .expect("record");
    assert_eq!(previous.run_id, 1);
}

#[test]
fn previous_completed_without_history_returns_none() {
    let (_dir, index) = sample_index();
    assert!(
        index
            .find_previous_completed("orders-etl", &"ab".repeat(32), "s1")
            .expect("lookup")
            .is_none()
    );
}
