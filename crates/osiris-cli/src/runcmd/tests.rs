// crates/osiris-cli/src/runcmd/tests.rs
// ============================================================================
// Module: Run Orchestration Tests
// Description: Unit tests for profile resolution and helper behavior.
// Purpose: Validate the single-profile invariant and timeout parsing.
// Dependencies: osiris-cli, tempfile
// ============================================================================

//! ## Overview
//! Validates profile resolution across the CLI/pointer matrix (explicit
//! must match, implicit adopts the pointer) and per-step timeout parsing.
//! Full run flows are covered by the workspace integration tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use osiris_config::FilesystemConfig;
use osiris_config::FilesystemContract;
use osiris_config::OsirisConfig;
use osiris_core::Profile;
use tempfile::TempDir;

use super::Engine;
use super::RunCmdError;
use super::RunOptions;
use super::resolve_profile;
use super::step_timeouts;

/// Builds a contract over a temp workspace.
fn sample_contract() -> (TempDir, FilesystemContract) {
    let base = tempfile::tempdir().expect("tempdir");
    let config = OsirisConfig {
        filesystem: FilesystemConfig {
            base_path: base.path().display().to_string(),
            ..FilesystemConfig::default()
        },
        ..OsirisConfig::default()
    };
    (base, FilesystemContract::load(config).expect("contract"))
}

/// Returns run options requesting a profile.
fn options(profile: Option<&str>) -> RunOptions {
    RunOptions {
        last_compile: true,
        manifest_path: None,
        profile: profile.map(str::to_string),
        engine: Engine::Local,
    }
}

// ============================================================================
// SECTION: Profile Resolution
// ============================================================================

#[test]
fn explicit_profile_must_match_the_pointer() {
    let (_base, contract) = sample_contract();
    let compiled = Profile::parse("dev").expect("profile");
    let resolved =
        resolve_profile(&contract, &options(Some("dev")), Some(&compiled)).expect("profile");
    assert_eq!(resolved.as_str(), "dev");

    let err = resolve_profile(&contract, &options(Some("prod")), Some(&compiled))
        .expect_err("expected mismatch");
    assert!(matches!(err, RunCmdError::ProfileMismatch { .. }));
}

#[test]
fn implicit_profile_adopts_the_pointer() {
    let (_base, contract) = sample_contract();
    let compiled = Profile::parse("prod").expect("profile");
    let resolved = resolve_profile(&contract, &options(None), Some(&compiled)).expect("profile");
    assert_eq!(resolved.as_str(), "prod");
}

#[test]
fn no_pointer_falls_back_to_config_default() {
    let (_base, contract) = sample_contract();
    let resolved = resolve_profile(&contract, &options(None), None).expect("profile");
    assert_eq!(resolved.as_str(), "dev");
}

// ============================================================================
// SECTION: Step Timeouts
// ============================================================================

#[test]
fn timeout_overrides_parse_from_cfg_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg_dir = dir.path().join("cfg");
    fs::create_dir_all(&cfg_dir).expect("cfg dir");
    fs::write(cfg_dir.join("extract.json"), "{\"x-timeout-seconds\": 120}").expect("cfg");
    fs::write(cfg_dir.join("export.json"), "{}").expect("cfg");

    let manifest = manifest_with_steps(&["extract", "export"]);
    let timeouts = step_timeouts(&manifest, dir.path());
    assert_eq!(timeouts.get("extract").copied(), Some(120));
    assert!(!timeouts.contains_key("export"));
}

/// Builds a manifest fixture naming the given steps.
fn manifest_with_steps(ids: &[&str]) -> osiris_compiler::Manifest {
    use osiris_compiler::manifest::Fingerprints;
    use osiris_compiler::manifest::ManifestMeta;
    use osiris_compiler::manifest::ManifestMetadata;
    use osiris_compiler::manifest::ManifestPipeline;
    use osiris_compiler::manifest::ManifestStep;
    use osiris_compiler::manifest::ToolchainInfo;

    osiris_compiler::Manifest {
        meta: ManifestMeta {
            generated_at: String::new(),
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
            steps: ids
                .iter()
                .map(|id| ManifestStep {
                    id: (*id).to_string(),
                    driver: "inline.extractor".to_string(),
                    mode: "extract".to_string(),
                    cfg_path: format!("cfg/{id}.json"),
                    needs: vec![],
                })
                .collect(),
        },
        metadata: ManifestMetadata {
            source_manifest_path: String::new(),
        },
    }
}

#[test]
fn run_options_carry_engine_selection() {
    assert_eq!(options(None).engine, Engine::Local);
}
