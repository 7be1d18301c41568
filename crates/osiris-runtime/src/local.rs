// crates/osiris-runtime/src/local.rs
// ============================================================================
// Module: Local Execution Adapter
// Description: In-process, sequential execution of a compiled manifest.
// Purpose: Drive per-step drivers with fail-fast cancellation semantics.
// Dependencies: osiris-compiler, osiris-core
// ============================================================================

//! ## Overview
//! The local adapter executes manifest steps strictly sequentially in
//! topological order. Each step gets its config from the build directory's
//! `cfg/*.json`, the outputs of its dependencies as inputs, and the session
//! context for telemetry. The first failure marks the step failed, stops
//! scheduling, and propagates a failed terminal status; steps that never
//! started are recorded as skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use osiris_compiler::Manifest;
use osiris_core::RunContext;
use osiris_core::RunStatus;
use osiris_core::RunTotals;
use osiris_core::SecretMap;
use osiris_core::StepId;
use osiris_core::time::utc_now_ms;
use serde_json::Value;
use thiserror::Error;

use crate::drivers::DriverRegistry;
use crate::session::SessionContext;
use crate::session::SessionError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by adapter infrastructure (not step failures).
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A step config file could not be read or parsed.
    #[error("step config unreadable at {path}: {message}")]
    Config {
        /// Config path that failed.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },
    /// Session stream I/O failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

// ============================================================================
// SECTION: Input & Result
// ============================================================================

/// Everything an adapter needs for one run.
pub struct ExecutionInput<'a> {
    /// Compiled manifest to execute.
    pub manifest: &'a Manifest,
    /// Build directory holding `cfg/*.json`.
    pub build_dir: &'a Path,
    /// Per-step secret maps resolved from the component registry.
    pub secret_maps: BTreeMap<String, SecretMap>,
    /// Per-step timeout overrides in seconds (`x-timeout-seconds`).
    pub step_timeouts: BTreeMap<String, u64>,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Terminal status.
    pub status: RunStatus,
    /// Rolled-up totals.
    pub totals: RunTotals,
    /// Step that failed first, when any.
    pub failed_step: Option<String>,
}

// ============================================================================
// SECTION: Local Adapter
// ============================================================================

/// Sequential in-process execution adapter.
pub struct LocalAdapter<'a> {
    /// Driver registry consulted per step.
    drivers: &'a DriverRegistry,
}

impl<'a> LocalAdapter<'a> {
    /// Creates a local adapter over a driver registry.
    #[must_use]
    pub const fn new(drivers: &'a DriverRegistry) -> Self {
        Self {
            drivers,
        }
    }

    /// Executes a manifest against the session context.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] only for infrastructure failures; step
    /// failures are reported through the returned [`ExecutionResult`].
    pub fn execute(
        &self,
        input: &ExecutionInput<'_>,
        session: &mut SessionContext,
    ) -> Result<ExecutionResult, ExecutionError> {
        let run_started = utc_now_ms();
        let mut totals = RunTotals::default();
        let mut outputs: BTreeMap<String, Value> = BTreeMap::new();
        let mut failed_step: Option<String> = None;
        let mut cancelled = false;

        for step in &input.manifest.pipeline.steps {
            if session.cancelled() {
                cancelled = true;
                break;
            }
            if failed_step.is_some() {
                break;
            }
            let Ok(step_id) = StepId::parse(&step.id) else {
                failed_step = Some(step.id.clone());
                break;
            };
            let secret_map =
                input.secret_maps.get(&step.id).cloned().unwrap_or_default();
            session.set_secret_map(secret_map);

            let mut fields = BTreeMap::new();
            fields.insert("step_id".to_string(), Value::String(step.id.clone()));
            fields.insert("driver".to_string(), Value::String(step.driver.clone()));
            session.append_event("step_start", fields)?;

            let config = read_step_config(input.build_dir, &step.cfg_path)?;
            let inputs: BTreeMap<String, Value> = step
                .needs
                .iter()
                .filter_map(|dep| outputs.get(dep).map(|value| (dep.clone(), value.clone())))
                .collect();

            let Some(driver) = self.drivers.get(&step.driver) else {
                self.fail_step(session, &step.id, "other", &format!(
                    "driver not available: {}",
                    step.driver
                ))?;
                totals.steps_failed += 1;
                failed_step = Some(step.id.clone());
                continue;
            };

            let step_started = utc_now_ms();
            match driver.run(&step_id, &config, &inputs, session) {
                Ok(output) => {
                    let duration =
                        u64::try_from(utc_now_ms() - step_started).unwrap_or_default();
                    let rows = output.rows.unwrap_or(0);
                    totals.rows += rows;
                    totals.steps_completed += 1;
                    session.append_metric(
                        &step.id,
                        "row_count",
                        Value::from(rows),
                        BTreeMap::new(),
                    )?;
                    session.append_metric(
                        &step.id,
                        "duration_ms",
                        Value::from(duration),
                        BTreeMap::new(),
                    )?;
                    let mut fields = BTreeMap::new();
                    fields.insert("step_id".to_string(), Value::String(step.id.clone()));
                    fields.insert("rows".to_string(), Value::from(rows));
                    fields.insert("duration_ms".to_string(), Value::from(duration));
                    session.append_event("step_complete", fields)?;
                    outputs.insert(
                        step.id.clone(),
                        Value::Object(output.outputs.into_iter().collect()),
                    );
                }
                Err(err) => {
                    self.fail_step(session, &step.id, err.kind.as_str(), &err.message)?;
                    totals.steps_failed += 1;
                    failed_step = Some(step.id.clone());
                }
            }
        }

        totals.duration_ms = u64::try_from(utc_now_ms() - run_started).unwrap_or_default();
        let status = if cancelled {
            RunStatus::Cancelled
        } else if failed_step.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        session.set_secret_map(SecretMap::default());
        session.close(status, totals)?;
        Ok(ExecutionResult {
            status,
            totals,
            failed_step,
        })
    }

    /// Emits the `step_failed` event with a redacted message.
    fn fail_step(
        &self,
        session: &mut SessionContext,
        step_id: &str,
        kind: &str,
        message: &str,
    ) -> Result<(), ExecutionError> {
        let mut fields = BTreeMap::new();
        fields.insert("step_id".to_string(), Value::String(step_id.to_string()));
        fields.insert("kind".to_string(), Value::String(kind.to_string()));
        fields.insert("message".to_string(), Value::String(message.to_string()));
        session.append_event("step_failed", fields)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Config Loading
// ============================================================================

/// Reads and parses one step's `cfg/<id>.json`.
fn read_step_config(build_dir: &Path, cfg_path: &str) -> Result<Value, ExecutionError> {
    let path = build_dir.join(cfg_path);
    let bytes = fs::read(&path).map_err(|err| ExecutionError::Config {
        path: path.clone(),
        message: err.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|err| ExecutionError::Config {
        path,
        message: err.to_string(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Shared manifest fixtures for runtime tests.
#[cfg(test)]
pub(crate) mod tests_support {
    use osiris_compiler::Manifest;
    use osiris_compiler::manifest::Fingerprints;
    use osiris_compiler::manifest::ManifestMeta;
    use osiris_compiler::manifest::ManifestMetadata;
    use osiris_compiler::manifest::ManifestPipeline;
    use osiris_compiler::manifest::ToolchainInfo;

    /// Returns a step-free manifest usable where execution fails earlier.
    pub(crate) fn empty_manifest() -> Manifest {
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
                steps: Vec::new(),
            },
            metadata: ManifestMetadata {
                source_manifest_path: String::new(),
            },
        }
    }
}
