// crates/osiris-runtime/src/bin/proxy_worker.rs
// ============================================================================
// Module: Proxy Worker
// Description: Sandbox-side executor speaking the proxy wire protocol.
// Purpose: Run steps inside the sandbox and stream telemetry to the host.
// Dependencies: osiris-core, osiris-runtime, serde_json
// ============================================================================

//! ## Overview
//! The worker reads one JSON command per stdin line and writes one JSON
//! message per stdout line. `prepare` establishes the session scope and
//! artifact root, `exec_step` runs a driver from the builtin registry and
//! reports `step_complete` or `error`, `cancel` raises the advisory flag,
//! and `cleanup` ends the loop. Unknown commands are ignored so older
//! hosts can drive newer workers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use osiris_core::ContextError;
use osiris_core::RunContext;
use osiris_core::StepId;
use osiris_core::time::utc_now_ms;
use osiris_runtime::DriverRegistry;
use osiris_runtime::HostCommand;
use osiris_runtime::WorkerMessage;
use serde_json::Value;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Worker entry point: pumps stdin commands until cleanup or EOF.
fn main() -> ExitCode {
    let stdin = std::io::stdin();
    let mut worker = Worker::new();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(command) = serde_json::from_str::<HostCommand>(&line) else {
            // Unknown commands are ignored for forward compatibility.
            continue;
        };
        if !worker.handle(command) {
            break;
        }
    }
    ExitCode::SUCCESS
}

// ============================================================================
// SECTION: Worker State
// ============================================================================

/// Sandbox-side execution state.
struct Worker {
    /// Builtin driver registry.
    drivers: DriverRegistry,
    /// Artifact root received from `prepare`.
    artifacts_dir: Option<PathBuf>,
    /// Outputs of completed steps, keyed by step id.
    outputs: BTreeMap<String, Value>,
    /// Advisory cancellation flag.
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    /// Creates a worker with the builtin drivers.
    fn new() -> Self {
        Self {
            drivers: DriverRegistry::with_builtins(),
            artifacts_dir: None,
            outputs: BTreeMap::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handles one command; returns false when the loop should end.
    fn handle(&mut self, command: HostCommand) -> bool {
        match command {
            HostCommand::Prepare {
                session_id,
                artifacts_dir,
                ..
            } => {
                self.artifacts_dir = Some(PathBuf::from(artifacts_dir));
                emit(&WorkerMessage::Ready {
                    session_id,
                });
                true
            }
            HostCommand::ExecStep {
                step_id,
                driver,
                config,
                inputs,
            } => {
                self.exec_step(&step_id, &driver, &config, inputs);
                true
            }
            HostCommand::Cancel {
                ..
            } => {
                self.cancelled.store(true, Ordering::Relaxed);
                true
            }
            HostCommand::Cleanup => false,
        }
    }

    /// Executes one step and reports its outcome.
    fn exec_step(&mut self, step_id: &str, driver_name: &str, config: &Value, inputs: Value) {
        let started = utc_now_ms();
        let Ok(typed_step) = StepId::parse(step_id) else {
            emit_error(Some(step_id), "other", "invalid step id");
            return;
        };
        let Some(driver) = self.drivers.get(driver_name) else {
            emit_error(Some(step_id), "other", &format!("driver not available: {driver_name}"));
            return;
        };
        let mut merged: BTreeMap<String, Value> = match inputs {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        for (dep, output) in &self.outputs {
            merged.entry(dep.clone()).or_insert_with(|| output.clone());
        }
        let mut ctx = WorkerContext {
            artifacts_dir: self.artifacts_dir.clone(),
            cancelled: Arc::clone(&self.cancelled),
        };
        match driver.run(&typed_step, config, &merged, &mut ctx) {
            Ok(output) => {
                let duration_ms = u64::try_from(utc_now_ms() - started).unwrap_or_default();
                let rows = output.rows.unwrap_or(0);
                self.outputs.insert(
                    step_id.to_string(),
                    Value::Object(output.outputs.into_iter().collect()),
                );
                emit(&WorkerMessage::StepComplete {
                    step_id: step_id.to_string(),
                    rows,
                    duration_ms,
                });
            }
            Err(err) => {
                emit_error(Some(step_id), err.kind.as_str(), &err.message);
            }
        }
    }
}

// ============================================================================
// SECTION: Worker Context
// ============================================================================

/// Run context that forwards telemetry as protocol messages.
struct WorkerContext {
    /// Artifact root inside the sandbox.
    artifacts_dir: Option<PathBuf>,
    /// Advisory cancellation flag.
    cancelled: Arc<AtomicBool>,
}

impl RunContext for WorkerContext {
    fn log_event(
        &mut self,
        event: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), ContextError> {
        emit(&WorkerMessage::Event {
            name: event.to_string(),
            data: Value::Object(fields.into_iter().collect()),
        });
        Ok(())
    }

    fn log_metric(
        &mut self,
        step_id: &StepId,
        metric: &str,
        value: Value,
        tags: BTreeMap<String, Value>,
    ) -> Result<(), ContextError> {
        emit(&WorkerMessage::Metric {
            name: metric.to_string(),
            step_id: step_id.as_str().to_string(),
            value,
            tags: Value::Object(tags.into_iter().collect()),
        });
        Ok(())
    }

    fn artifact_path(&mut self, step_id: &StepId, name: &str) -> Result<PathBuf, ContextError> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ContextError::Io(format!("bad artifact name {name:?}")));
        }
        let Some(root) = &self.artifacts_dir else {
            return Err(ContextError::Io("worker not prepared".to_string()));
        };
        let dir = root.join(step_id.as_str());
        std::fs::create_dir_all(&dir).map_err(|err| ContextError::Io(err.to_string()))?;
        Ok(dir.join(name))
    }

    fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

// ============================================================================
// SECTION: Emit Helpers
// ============================================================================

/// Writes one protocol message line to stdout.
fn emit(message: &WorkerMessage) {
    if let Ok(line) = message.encode() {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(line.as_bytes());
        let _ = stdout.write_all(b"\n");
        let _ = stdout.flush();
    }
}

/// Writes one error message line to stdout.
fn emit_error(step_id: Option<&str>, kind: &str, message: &str) {
    emit(&WorkerMessage::Error {
        step_id: step_id.map(str::to_string),
        kind: kind.to_string(),
        message: message.to_string(),
    });
}
