// crates/osiris-compiler/tests/compile_artifacts.rs
// ============================================================================
// Module: Compile Artifact Tests
// Description: Integration tests for build artifact generation.
// ============================================================================
//! ## Overview
//! Compiles the orders fixture end to end and validates the artifact
//! directory layout, pointer files, compile determinism (identical hash on
//! recompile), and that failed compiles leave no partial directory and do
//! not touch `last_compile.txt`.

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

use osiris_compiler::CompileOptions;
use osiris_compiler::Compiler;
use osiris_compiler::Manifest;
use osiris_config::FilesystemConfig;
use osiris_config::FilesystemContract;
use osiris_config::OsirisConfig;
use osiris_config::PointerFile;
use osiris_registry::Registry;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// The orders pipeline used by the end-to-end scenarios.
const ORDERS_OML: &[u8] = b"oml_version: \"0.1.0\"
name: orders_etl
steps:
  - id: extract
    component: mysql.extractor
    mode: extract
    config: {connection: \"@mysql.default\", table: orders}
  - id: export
    component: csv.writer
    mode: write
    depends_on: [extract]
    config: {connection: \"@fs.local\", path: out/orders.csv}
";

/// Writes a component spec file under the root.
fn write_spec(root: &Path, name: &str, body: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("component dir");
    fs::write(dir.join("spec.yaml"), body).expect("spec file");
}

/// Builds a workspace with contract, registry, and compiler fixtures.
fn workspace() -> (TempDir, FilesystemContract, Registry) {
    let base = tempfile::tempdir().expect("tempdir");
    let config = OsirisConfig {
        filesystem: FilesystemConfig {
            base_path: base.path().display().to_string(),
            ..FilesystemConfig::default()
        },
        ..OsirisConfig::default()
    };
    let contract = FilesystemContract::load(config).expect("contract");
    let components = base.path().join("components");
    write_spec(
        &components,
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
        &components,
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
    let registry = Registry::load(&components).expect("registry");
    (base, contract, registry)
}

/// Returns compile options for the dev profile.
fn dev_options(contract: &FilesystemContract) -> CompileOptions {
    CompileOptions {
        profile: contract.config().resolve_profile(Some("dev")).expect("profile"),
        params: BTreeMap::new(),
    }
}

// ============================================================================
// SECTION: Artifact Layout
// ============================================================================

#[test]
fn compile_writes_expected_artifact_layout() {
    let (_base, contract, registry) = workspace();
    let compiler = Compiler::new(&contract, &registry);
    let outcome = compiler.compile(ORDERS_OML, &dev_options(&contract)).expect("compile");

    assert!(outcome.paths.dir.is_dir());
    assert!(outcome.paths.manifest.is_file());
    assert!(outcome.paths.plan.is_file());
    assert!(outcome.paths.fingerprints.is_file());
    assert!(outcome.paths.run_summary.is_file());
    assert!(outcome.paths.cfg_dir.join("extract.json").is_file());
    assert!(outcome.paths.cfg_dir.join("export.json").is_file());

    let dir_name = outcome.paths.dir.file_name().and_then(|name| name.to_str()).expect("dir");
    assert_eq!(dir_name, format!("{}-{}", outcome.short.as_str(), outcome.hash.as_str()));
    assert!(outcome.paths.dir.to_string_lossy().contains("build/pipelines/dev/orders-etl"));
}

#[test]
fn compile_updates_three_pointer_files() {
    let (_base, contract, registry) = workspace();
    let compiler = Compiler::new(&contract, &registry);
    let outcome = compiler.compile(ORDERS_OML, &dev_options(&contract)).expect("compile");

    let latest = PointerFile::read(&outcome.paths.latest_ptr).expect("LATEST");
    assert_eq!(latest.manifest_path, outcome.paths.manifest);
    assert_eq!(latest.hash, outcome.hash);
    assert_eq!(latest.profile.as_str(), "dev");

    let index = contract.index_paths();
    let by_slug = PointerFile::read(&index.latest_dir.join("orders-etl.txt")).expect("latest");
    assert_eq!(by_slug, latest);
    let last_compile = PointerFile::read(&index.last_compile).expect("last_compile");
    assert_eq!(last_compile, latest);
}

#[test]
fn manifest_reloads_and_verifies_hash() {
    let (_base, contract, registry) = workspace();
    let compiler = Compiler::new(&contract, &registry);
    let outcome = compiler.compile(ORDERS_OML, &dev_options(&contract)).expect("compile");
    let manifest = Manifest::load(&outcome.paths.manifest).expect("reload");
    assert_eq!(manifest.pipeline.fingerprints.manifest_fp, outcome.hash.as_str());
    assert_eq!(manifest.meta.profile, "dev");
    let ids: Vec<&str> = manifest.pipeline.steps.iter().map(|step| step.id.as_str()).collect();
    assert_eq!(ids, vec!["extract", "export"]);
}

// ============================================================================
// SECTION: Determinism
// ============================================================================

#[test]
fn recompile_yields_identical_hash_and_directory() {
    let (_base, contract, registry) = workspace();
    let compiler = Compiler::new(&contract, &registry);
    let options = dev_options(&contract);
    let first = compiler.compile(ORDERS_OML, &options).expect("first compile");
    let second = compiler.compile(ORDERS_OML, &options).expect("second compile");

    assert_eq!(first.hash, second.hash);
    assert_eq!(first.paths.dir, second.paths.dir);
    let manifest_bytes = fs::read(&first.paths.manifest).expect("manifest bytes");
    assert!(!manifest_bytes.is_empty());
}

#[test]
fn params_change_the_hash() {
    let (_base, contract, registry) = workspace();
    let compiler = Compiler::new(&contract, &registry);
    let oml = b"oml_version: \"0.1.0\"
name: orders_etl
steps:
  - id: extract
    component: mysql.extractor
    mode: extract
    config: {connection: \"@mysql.default\", table: \"${params.table}\"}
";
    let mut options = dev_options(&contract);
    options.params.insert("table".to_string(), "orders".to_string());
    let first = compiler.compile(oml, &options).expect("first compile");
    options.params.insert("table".to_string(), "customers".to_string());
    let second = compiler.compile(oml, &options).expect("second compile");
    assert_ne!(first.hash, second.hash);
}

// ============================================================================
// SECTION: Failure Behavior
// ============================================================================

#[test]
fn failed_compile_leaves_no_partial_directory() {
    let (_base, contract, registry) = workspace();
    let compiler = Compiler::new(&contract, &registry);
    let invalid = b"oml_version: \"0.1.0\"
name: orders_etl
steps:
  - id: extract
    component: oracle.extractor
    mode: extract
    config: {connection: \"@oracle.default\", table: orders}
";
    assert!(compiler.compile(invalid, &dev_options(&contract)).is_err());

    let index = contract.index_paths();
    assert!(!index.last_compile.exists());
    let build_root = contract.base_path().join("build");
    assert!(!build_root.exists() || dir_is_empty_recursive(&build_root));
}

/// Returns true when a directory tree contains no files.
fn dir_is_empty_recursive(path: &Path) -> bool {
    let Ok(entries) = fs::read_dir(path) else {
        return true;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            if !dir_is_empty_recursive(&entry_path) {
                return false;
            }
        } else {
            return false;
        }
    }
    true
}
