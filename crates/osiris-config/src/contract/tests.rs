// crates/osiris-config/src/contract/tests.rs
// ============================================================================
// Module: Filesystem Contract Tests
// Description: Unit tests for path resolution and pointer files.
// Purpose: Validate template rendering, path shapes, and pointer format.
// Dependencies: osiris-config, tempfile
// ============================================================================

//! ## Overview
//! Validates the contract's path families against the documented layout,
//! the loud failure on unknown template tokens, the three-line pointer
//! format (including rejection of the `None` profile literal), and atomic
//! replacement behavior.

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
use std::path::PathBuf;

use osiris_core::ManifestHash;
use osiris_core::PipelineSlug;
use osiris_core::Profile;
use osiris_core::RunId;

use super::FilesystemContract;
use super::PointerFile;
use super::TemplateTokens;
use super::replace_file;
use crate::config::FilesystemConfig;
use crate::config::OsirisConfig;

/// Returns a contract rooted at a fixed absolute path.
fn sample_contract() -> FilesystemContract {
    let config = OsirisConfig {
        filesystem: FilesystemConfig {
            base_path: "/workspace/project".to_string(),
            ..FilesystemConfig::default()
        },
        ..OsirisConfig::default()
    };
    FilesystemContract::load(config).expect("contract")
}

/// Returns the fixture manifest hash used across path tests.
fn sample_hash() -> ManifestHash {
    ManifestHash::parse(&"0123456789abcdef".repeat(4)).expect("hash")
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn render_substitutes_known_tokens() {
    let tokens = TemplateTokens {
        run_ts: Some("20260201T093000Z".to_string()),
        run_id: Some("3".to_string()),
        manifest_short: Some("0123456".to_string()),
        ..TemplateTokens::default()
    };
    let rendered =
        FilesystemContract::render("{run_ts}_{run_id}-{manifest_short}", &tokens).expect("render");
    assert_eq!(rendered, "20260201T093000Z_3-0123456");
}

#[test]
fn render_fails_loud_on_unknown_token() {
    let tokens = TemplateTokens::default();
    assert!(FilesystemContract::render("{mystery}", &tokens).is_err());
}

#[test]
fn render_fails_loud_on_unpopulated_token() {
    let tokens = TemplateTokens::default();
    assert!(FilesystemContract::render("{run_id}", &tokens).is_err());
}

// ============================================================================
// SECTION: Path Families
// ============================================================================

#[test]
fn manifest_paths_follow_layout() {
    let contract = sample_contract();
    let slug = PipelineSlug::derive("orders_etl").expect("slug");
    let profile = Profile::parse("dev").expect("profile");
    let hash = sample_hash();
    let short = hash.short(7).expect("short");
    let paths = contract.manifest_paths(&slug, &profile, &short, &hash).expect("paths");
    let expected_dir = PathBuf::from(format!(
        "/workspace/project/build/pipelines/dev/orders-etl/0123456-{}",
        hash.as_str()
    ));
    assert_eq!(paths.dir, expected_dir);
    assert_eq!(paths.manifest, expected_dir.join("manifest.yaml"));
    assert_eq!(paths.plan, expected_dir.join("plan.json"));
    assert_eq!(paths.cfg_dir, expected_dir.join("cfg"));
    assert_eq!(
        paths.latest_ptr,
        PathBuf::from("/workspace/project/build/pipelines/dev/orders-etl/LATEST")
    );
    assert!(contract.contains(&paths.dir));
}

#[test]
fn run_log_paths_follow_layout() {
    let contract = sample_contract();
    let slug = PipelineSlug::derive("orders_etl").expect("slug");
    let profile = Profile::parse("dev").expect("profile");
    let hash = sample_hash();
    let short = hash.short(7).expect("short");
    let run_id = RunId::from_raw(3).expect("run id");
    let paths = contract
        .run_log_paths(&slug, &profile, "20260201T093000Z", run_id, &short)
        .expect("paths");
    let expected_dir = PathBuf::from(
        "/workspace/project/run_logs/dev/orders-etl/20260201T093000Z_3-0123456",
    );
    assert_eq!(paths.dir, expected_dir);
    assert_eq!(paths.events, expected_dir.join("events.jsonl"));
    assert_eq!(paths.metrics, expected_dir.join("metrics.jsonl"));
    assert_eq!(paths.log, expected_dir.join("osiris.log"));
    assert_eq!(paths.status, expected_dir.join("status.json"));
    assert_eq!(paths.artifacts_dir, expected_dir.join("artifacts"));
}

#[test]
fn aiop_paths_follow_layout() {
    let contract = sample_contract();
    let slug = PipelineSlug::derive("orders_etl").expect("slug");
    let profile = Profile::parse("dev").expect("profile");
    let hash = sample_hash();
    let short = hash.short(7).expect("short");
    let run_id = RunId::from_raw(2).expect("run id");
    let paths = contract.aiop_paths(&slug, &profile, &short, &hash, run_id).expect("paths");
    let expected_dir = PathBuf::from(format!(
        "/workspace/project/aiop/dev/orders-etl/0123456-{}/2",
        hash.as_str()
    ));
    assert_eq!(paths.dir, expected_dir);
    assert_eq!(paths.core, expected_dir.join("core.json"));
    assert_eq!(paths.run_card, expected_dir.join("run-card.md"));
    assert_eq!(paths.annex_dir, expected_dir.join("annex"));
}

#[test]
fn index_paths_follow_layout() {
    let contract = sample_contract();
    let paths = contract.index_paths();
    assert_eq!(paths.runs_jsonl, PathBuf::from("/workspace/project/.osiris/index/runs.jsonl"));
    assert_eq!(paths.by_pipeline_dir, PathBuf::from("/workspace/project/.osiris/index/by_pipeline"));
    assert_eq!(paths.latest_dir, PathBuf::from("/workspace/project/.osiris/index/latest"));
    assert_eq!(
        paths.last_compile,
        PathBuf::from("/workspace/project/.osiris/index/last_compile.txt")
    );
    assert_eq!(paths.counters_db, PathBuf::from("/workspace/project/.osiris/index/counters.sqlite"));
}

// ============================================================================
// SECTION: Pointer Files
// ============================================================================

#[test]
fn pointer_round_trips_three_lines() {
    let pointer = PointerFile {
        manifest_path: PathBuf::from("/workspace/project/build/m/manifest.yaml"),
        hash: sample_hash(),
        profile: Profile::parse("dev").expect("profile"),
    };
    let encoded = pointer.encode();
    assert_eq!(encoded.matches('\n').count(), 3);
    assert!(encoded.ends_with('\n'));
    let parsed = PointerFile::parse(&encoded).expect("parse");
    assert_eq!(parsed, pointer);
}

#[test]
fn pointer_rejects_none_profile_literal() {
    let contents = format!(
        "/workspace/project/build/m/manifest.yaml\n{}\nNone\n",
        sample_hash().as_str()
    );
    assert!(PointerFile::parse(&contents).is_err());
}

#[test]
fn pointer_rejects_wrong_line_count() {
    assert!(PointerFile::parse("/abs/manifest.yaml\n").is_err());
}

#[test]
fn pointer_rejects_relative_manifest_path() {
    let contents = format!("relative/manifest.yaml\n{}\ndev\n", sample_hash().as_str());
    assert!(PointerFile::parse(&contents).is_err());
}

// ============================================================================
// SECTION: Atomic Replacement
// ============================================================================

#[test]
fn replace_file_swaps_contents_atomically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("LATEST");
    replace_file(&target, b"first\n").expect("first write");
    replace_file(&target, b"second\n").expect("second write");
    let contents = fs::read_to_string(&target).expect("read");
    assert_eq!(contents, "second\n");
    assert!(!target.with_file_name("LATEST.tmp").exists());
}
