// crates/osiris-cli/src/runcmd.rs
// ============================================================================
// Module: Run Orchestration
// Description: Executes a compiled manifest and records the outcome.
// Purpose: Wire allocator, session, adapter, index, and AIOP into one run.
// Dependencies: osiris-aiop, osiris-compiler, osiris-index, osiris-runtime
// ============================================================================

//! ## Overview
//! One run flows through fixed stages: resolve the manifest (explicit path
//! or the last-compile pointer), resolve a single profile for the whole
//! invocation, allocate a run id and session id, create the run-log
//! directory with manifest and config copies, execute through the chosen
//! adapter, export the AIOP package, and append exactly one record to the
//! run index. The profile never diverges between compile and run: an
//! explicit `--profile` must match the pointer, and an implicit run adopts
//! the pointer's profile.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use osiris_aiop::AiopError;
use osiris_aiop::AiopExporter;
use osiris_aiop::ExportInput;
use osiris_compiler::Manifest;
use osiris_config::FilesystemContract;
use osiris_core::ErrorFamily;
use osiris_core::PipelineSlug;
use osiris_core::Profile;
use osiris_core::SecretMap;
use osiris_core::time::format_iso_basic;
use osiris_core::time::utc_now_ms;
use osiris_index::RunIdAllocator;
use osiris_index::RunIndex;
use osiris_index::RunRecord;
use osiris_registry::Registry;
use osiris_runtime::DriverRegistry;
use osiris_runtime::ExecutionInput;
use osiris_runtime::LocalAdapter;
use osiris_runtime::ProcessSandbox;
use osiris_runtime::ProxyAdapter;
use osiris_runtime::SessionContext;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Options & Report
// ============================================================================

/// Execution engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// In-process drivers.
    Local,
    /// Transparent proxy through the sandbox worker.
    E2b,
}

/// Options for one `osiris run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run the manifest recorded by `last_compile.txt`.
    pub last_compile: bool,
    /// Explicit manifest file or build directory.
    pub manifest_path: Option<PathBuf>,
    /// Profile requested on the command line.
    pub profile: Option<String>,
    /// Engine selection.
    pub engine: Engine,
}

/// Summary of one completed run invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Allocated run id.
    pub run_id: u64,
    /// Session identifier.
    pub session_id: String,
    /// Terminal status label.
    pub status: String,
    /// Total rows moved.
    pub rows: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Manifest hash executed.
    pub manifest_hash: String,
    /// Run-log directory.
    pub run_dir: String,
    /// AIOP core path when exported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aiop_core: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by run orchestration.
#[derive(Debug, Error)]
pub enum RunCmdError {
    /// Configuration or pointer resolution failed.
    #[error("run configuration failed: {0}")]
    Config(String),
    /// Profile passed on the CLI diverges from the compiled pointer.
    #[error("profile mismatch: requested {requested}, compiled under {compiled}")]
    ProfileMismatch {
        /// Profile requested on the command line.
        requested: String,
        /// Profile recorded by the compile pointer.
        compiled: String,
    },
    /// Manifest loading failed.
    #[error("manifest unreadable: {0}")]
    Manifest(String),
    /// Run-id allocation failed.
    #[error("run id allocation failed: {0}")]
    Allocator(String),
    /// Execution infrastructure failed.
    #[error("execution failed: {0}")]
    Execution(String),
    /// Run index append failed.
    #[error("run index append failed: {0}")]
    Index(String),
    /// AIOP export failed.
    #[error("aiop export failed: {0}")]
    Aiop(String),
    /// AIOP export detected a secret leak.
    #[error("aiop secret leak: {0}")]
    SecretLeak(String),
}

impl RunCmdError {
    /// Returns the error family for exit-code mapping.
    #[must_use]
    pub const fn family(&self) -> ErrorFamily {
        match self {
            Self::Config(_) | Self::ProfileMismatch { .. } => ErrorFamily::Config,
            Self::Manifest(_) => ErrorFamily::Compile,
            Self::Allocator(_) | Self::Index(_) => ErrorFamily::Storage,
            Self::Execution(_) | Self::Aiop(_) => ErrorFamily::Run,
            Self::SecretLeak(_) => ErrorFamily::Security,
        }
    }
}

// ============================================================================
// SECTION: Run Orchestration
// ============================================================================

/// Executes one run under the contract and returns its report.
///
/// # Errors
///
/// Returns [`RunCmdError`]; a run whose steps failed still returns `Ok`
/// with `status = failed` so the caller can map the exit code from the
/// status rather than from an infrastructure error.
pub fn run(contract: &FilesystemContract, options: &RunOptions) -> Result<RunReport, RunCmdError> {
    let index = RunIndex::new(contract.index_paths());
    let (manifest_path, pointer_profile) = resolve_manifest_path(contract, &index, options)?;
    let manifest =
        Manifest::load(&manifest_path).map_err(|err| RunCmdError::Manifest(err.to_string()))?;
    let profile = resolve_profile(contract, options, pointer_profile.as_ref())?;

    let slug = PipelineSlug::parse(&manifest.pipeline.slug)
        .map_err(|err| RunCmdError::Manifest(err.to_string()))?;
    let hash = manifest.hash().map_err(|err| RunCmdError::Manifest(err.to_string()))?;
    let short = hash
        .short(contract.manifest_short_len())
        .map_err(|err| RunCmdError::Manifest(err.to_string()))?;
    let build_dir = manifest_path
        .parent()
        .ok_or_else(|| RunCmdError::Manifest("manifest has no parent directory".to_string()))?
        .to_path_buf();

    let allocator = RunIdAllocator::open(&contract.index_paths().counters_db)
        .map_err(|err| RunCmdError::Allocator(err.to_string()))?;
    let run_id = allocator
        .next(slug.as_str(), profile.as_str())
        .map_err(|err| RunCmdError::Allocator(err.to_string()))?;
    let session_id = allocator.session_id(run_id, &short);
    let run_ts = format_iso_basic(utc_now_ms())
        .map_err(|err| RunCmdError::Config(err.to_string()))?;

    let paths = contract
        .run_log_paths(&slug, &profile, &run_ts, run_id, &short)
        .map_err(|err| RunCmdError::Config(err.to_string()))?;
    let mut session = SessionContext::create(session_id.clone(), paths)
        .map_err(|err| RunCmdError::Execution(err.to_string()))?;
    copy_build_inputs(&manifest_path, &build_dir, &manifest, &mut session)?;

    session
        .start(slug.as_str(), profile.as_str())
        .map_err(|err| RunCmdError::Execution(err.to_string()))?;

    let registry = Registry::load(&contract.components_dir()).ok();
    let input = ExecutionInput {
        manifest: &manifest,
        build_dir: &build_dir,
        secret_maps: secret_maps(&manifest, registry.as_ref()),
        step_timeouts: step_timeouts(&manifest, &build_dir),
    };
    let drivers = DriverRegistry::with_builtins();
    let result = match options.engine {
        Engine::Local => LocalAdapter::new(&drivers)
            .execute(&input, &mut session)
            .map_err(|err| RunCmdError::Execution(err.to_string()))?,
        Engine::E2b => {
            let worker = worker_binary()?;
            let sandbox = ProcessSandbox::new(worker);
            ProxyAdapter::new(&sandbox)
                .execute(&input, &mut session)
                .map_err(|err| RunCmdError::Execution(err.to_string()))?
        }
    };

    let started_at = session.started_at().to_string();
    let ended_ms = utc_now_ms();
    let ended_at = osiris_core::time::format_rfc3339_millis(ended_ms)
        .map_err(|err| RunCmdError::Execution(err.to_string()))?;
    let mut record = RunRecord {
        run_id: run_id.get(),
        session_id: session_id.as_str().to_string(),
        pipeline_slug: slug.as_str().to_string(),
        profile: profile.as_str().to_string(),
        manifest_hash: hash.as_str().to_string(),
        manifest_short: short.as_str().to_string(),
        status: result.status.as_str().to_string(),
        started_at,
        ended_at,
        rows: result.totals.rows,
        duration_ms: result.totals.duration_ms,
        run_logs_path: session.paths().dir.display().to_string(),
        aiop_path: None,
    };

    let aiop_core = if contract.config().aiop.enabled {
        let exporter = AiopExporter::new(contract.config().aiop.clone());
        let outcome = exporter
            .export(&ExportInput {
                contract,
                index: &index,
                manifest: &manifest,
                record: &record,
            })
            .map_err(|err| match err {
                AiopError::SecretLeak {
                    ..
                } => RunCmdError::SecretLeak(err.to_string()),
                other => RunCmdError::Aiop(other.to_string()),
            })?;
        record.aiop_path = Some(outcome.paths.core.display().to_string());
        Some(outcome.paths.core.display().to_string())
    } else {
        None
    };

    index.append(&record).map_err(|err| RunCmdError::Index(err.to_string()))?;

    Ok(RunReport {
        run_id: run_id.get(),
        session_id: session_id.as_str().to_string(),
        status: record.status,
        rows: record.rows,
        duration_ms: record.duration_ms,
        manifest_hash: record.manifest_hash,
        run_dir: record.run_logs_path,
        aiop_core,
    })
}

// ============================================================================
// SECTION: Resolution Helpers
// ============================================================================

/// Resolves the manifest path and, when pointer-based, its profile.
fn resolve_manifest_path(
    contract: &FilesystemContract,
    index: &RunIndex,
    options: &RunOptions,
) -> Result<(PathBuf, Option<Profile>), RunCmdError> {
    if let Some(path) = &options.manifest_path {
        let manifest_name = &contract.config().filesystem.artifacts.manifest;
        let resolved =
            if path.is_dir() { path.join(manifest_name) } else { path.clone() };
        return Ok((resolved, None));
    }
    if options.last_compile {
        let pointer =
            index.last_compile().map_err(|err| RunCmdError::Config(err.to_string()))?;
        return Ok((pointer.manifest_path, Some(pointer.profile)));
    }
    Err(RunCmdError::Config(
        "pass a manifest path or --last-compile".to_string(),
    ))
}

/// Resolves the single profile for this invocation.
fn resolve_profile(
    contract: &FilesystemContract,
    options: &RunOptions,
    pointer_profile: Option<&Profile>,
) -> Result<Profile, RunCmdError> {
    match (&options.profile, pointer_profile) {
        (Some(requested), Some(compiled)) => {
            let requested = contract
                .config()
                .resolve_profile(Some(requested.as_str()))
                .map_err(|err| RunCmdError::Config(err.to_string()))?;
            if &requested != compiled {
                return Err(RunCmdError::ProfileMismatch {
                    requested: requested.as_str().to_string(),
                    compiled: compiled.as_str().to_string(),
                });
            }
            Ok(requested)
        }
        (Some(requested), None) => contract
            .config()
            .resolve_profile(Some(requested.as_str()))
            .map_err(|err| RunCmdError::Config(err.to_string())),
        (None, Some(compiled)) => Ok(compiled.clone()),
        (None, None) => contract
            .config()
            .resolve_profile(None)
            .map_err(|err| RunCmdError::Config(err.to_string())),
    }
}

/// Copies the manifest and per-step configs into the run-log directory.
fn copy_build_inputs(
    manifest_path: &Path,
    build_dir: &Path,
    manifest: &Manifest,
    session: &mut SessionContext,
) -> Result<(), RunCmdError> {
    let bytes =
        fs::read(manifest_path).map_err(|err| RunCmdError::Manifest(err.to_string()))?;
    fs::write(&session.paths().manifest_copy, &bytes)
        .map_err(|err| RunCmdError::Execution(err.to_string()))?;
    for step in &manifest.pipeline.steps {
        let source = build_dir.join(&step.cfg_path);
        let target = session.paths().cfg_dir.join(format!("{}.json", step.id));
        if let Ok(cfg_bytes) = fs::read(&source) {
            fs::write(&target, cfg_bytes)
                .map_err(|err| RunCmdError::Execution(err.to_string()))?;
        }
    }
    Ok(())
}

/// Builds the per-step secret maps from the component registry.
fn secret_maps(manifest: &Manifest, registry: Option<&Registry>) -> BTreeMap<String, SecretMap> {
    let mut maps = BTreeMap::new();
    let Some(registry) = registry else {
        return maps;
    };
    for step in &manifest.pipeline.steps {
        if let Ok(map) = registry.secret_map(&step.driver) {
            maps.insert(step.id.clone(), map);
        }
    }
    maps
}

/// Reads per-step timeout overrides (`x-timeout-seconds`) from cfg files.
fn step_timeouts(manifest: &Manifest, build_dir: &Path) -> BTreeMap<String, u64> {
    let mut timeouts = BTreeMap::new();
    for step in &manifest.pipeline.steps {
        let path = build_dir.join(&step.cfg_path);
        let Some(config) = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        else {
            continue;
        };
        if let Some(seconds) = config.get("x-timeout-seconds").and_then(Value::as_u64) {
            timeouts.insert(step.id.clone(), seconds);
        }
    }
    timeouts
}

/// Locates the proxy worker binary next to the current executable.
fn worker_binary() -> Result<PathBuf, RunCmdError> {
    let current = std::env::current_exe()
        .map_err(|err| RunCmdError::Execution(err.to_string()))?;
    let dir = current
        .parent()
        .ok_or_else(|| RunCmdError::Execution("executable has no parent".to_string()))?;
    let worker = dir.join("osiris-proxy-worker");
    if worker.exists() {
        Ok(worker)
    } else {
        Err(RunCmdError::Execution(format!(
            "proxy worker not found at {}",
            worker.display()
        )))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
