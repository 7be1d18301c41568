// crates/osiris-cli/src/init/tests.rs
// ============================================================================
// Module: Init Tests
// Description: Unit tests for project scaffolding.
// Purpose: Validate idempotence and non-destructive behavior.
// Dependencies: osiris-cli, tempfile
// ============================================================================

//! ## Overview
//! Validates that init writes a loadable config, seeds components, merges
//! `.gitignore` without duplication, refuses to overwrite without
//! `--force`, and overwrites with it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use osiris_config::OsirisConfig;

use super::run;

// ============================================================================
// SECTION: Scaffolding
// ============================================================================

#[test]
fn init_writes_loadable_config_and_subtree() {
    let dir = tempfile::tempdir().expect("tempdir");
    run(dir.path(), false).expect("init");

    let config = OsirisConfig::load(&dir.path().join("osiris.yaml")).expect("config");
    assert_eq!(config.filesystem.base_path, dir.path().display().to_string());
    assert!(dir.path().join(".osiris/index/by_pipeline").is_dir());
    assert!(dir.path().join(".osiris/index/latest").is_dir());
    assert!(dir.path().join("components/mysql.extractor/spec.yaml").is_file());
    assert!(dir.path().join("components/csv.writer/spec.yaml").is_file());
    assert!(dir.path().join("components/inline.extractor/spec.yaml").is_file());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = tempfile::tempdir().expect("tempdir");
    run(dir.path(), false).expect("first init");
    assert!(run(dir.path(), false).is_err());
    assert!(run(dir.path(), true).is_ok());
}

#[test]
fn gitignore_merges_without_duplicates() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(".gitignore"), "/target/\n/build/\n").expect("seed");
    run(dir.path(), false).expect("init");

    let contents = fs::read_to_string(dir.path().join(".gitignore")).expect("gitignore");
    assert_eq!(contents.matches("/build/").count(), 1);
    assert!(contents.contains("/target/"));
    assert!(contents.contains("/run_logs/"));
    assert!(contents.contains("/.osiris/"));
}

#[test]
fn seeded_specs_pass_registry_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    run(dir.path(), false).expect("init");
    let registry =
        osiris_registry::Registry::load(&dir.path().join("components")).expect("registry");
    assert_eq!(registry.list(None).expect("list").len(), 3);
}
