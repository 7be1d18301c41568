// crates/osiris-runtime/src/proxy.rs
// ============================================================================
// Module: Transparent Proxy Adapter
// Description: Remote execution through a sandboxed worker over stdio.
// Purpose: Stream events/metrics back and keep on-disk layout identical.
// Dependencies: osiris-compiler, osiris-core, crate::protocol
// ============================================================================

//! ## Overview
//! The proxy adapter drives a worker process through the newline-delimited
//! JSON protocol in [`crate::protocol`]. Worker stdout is pumped by a
//! dedicated reader thread into a channel; the control loop waits with
//! deadlines (`recv_timeout`) per request. `event` and `metric` messages
//! are transparent passthroughs written into the same session streams as
//! the local path, so the run-log layout is byte-comparable. Worker crash
//! or broken pipe maps to `RemoteCrashed`; a step exceeding its budget
//! kills the worker and maps to `Timeout`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::PathBuf;
use std::process::Child;
use std::process::ChildStdin;
use std::process::Command;
use std::process::Stdio;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use osiris_core::RunContext;
use osiris_core::RunStatus;
use osiris_core::RunTotals;
use osiris_core::SecretMap;
use osiris_core::time::utc_now_ms;
use serde_json::Value;
use thiserror::Error;

use crate::local::ExecutionError;
use crate::local::ExecutionInput;
use crate::local::ExecutionResult;
use crate::protocol::HostCommand;
use crate::protocol::WorkerMessage;
use crate::session::SessionContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Sandbox bring-up budget (ready message deadline).
pub const SANDBOX_READY_TIMEOUT: Duration = Duration::from_secs(60);
/// Default request timeout for prepare/cleanup commands.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default per-step execution budget in seconds.
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 15 * 60;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the proxy adapter.
///
/// # Invariants
/// - Variants are stable for run failure classification.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The sandbox could not start.
    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(String),
    /// The worker died or its pipe broke mid-run.
    #[error("remote worker crashed: {0}")]
    RemoteCrashed(String),
    /// A request exceeded its deadline.
    #[error("remote timeout after {seconds}s{}", step_id.as_ref().map(|id| format!(" in step {id}")).unwrap_or_default())]
    Timeout {
        /// Step in flight, when step-scoped.
        step_id: Option<String>,
        /// Budget that elapsed.
        seconds: u64,
    },
    /// Protocol encoding failed.
    #[error("proxy protocol error: {0}")]
    Protocol(String),
    /// Session stream I/O failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

// ============================================================================
// SECTION: Sandbox Seam
// ============================================================================

/// Launches worker processes for the proxy adapter.
///
/// Remote sandbox backends (e.g. cloud executors) implement this trait
/// outside the core; [`ProcessSandbox`] runs the worker locally so proxy
/// runs are testable without any external service.
pub trait Sandbox {
    /// Spawns the worker with piped stdin/stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::SandboxUnavailable`] when the worker cannot
    /// start.
    fn launch(&self) -> Result<Child, ProxyError>;

    /// Returns a short backend label for telemetry.
    fn name(&self) -> &str;
}

/// Sandbox spawning the worker binary as a local subprocess.
pub struct ProcessSandbox {
    /// Worker executable path.
    worker: PathBuf,
    /// Additional arguments.
    args: Vec<String>,
}

impl ProcessSandbox {
    /// Creates a process sandbox for a worker executable.
    #[must_use]
    pub fn new(worker: PathBuf) -> Self {
        Self {
            worker,
            args: Vec::new(),
        }
    }
}

impl Sandbox for ProcessSandbox {
    fn launch(&self) -> Result<Child, ProxyError> {
        Command::new(&self.worker)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| ProxyError::SandboxUnavailable(err.to_string()))
    }

    fn name(&self) -> &str {
        "process"
    }
}

// ============================================================================
// SECTION: Proxy Adapter
// ============================================================================

/// Remote execution adapter streaming through a sandboxed worker.
pub struct ProxyAdapter<'a> {
    /// Sandbox backend launching the worker.
    sandbox: &'a dyn Sandbox,
}

impl<'a> ProxyAdapter<'a> {
    /// Creates a proxy adapter over a sandbox backend.
    #[must_use]
    pub const fn new(sandbox: &'a dyn Sandbox) -> Self {
        Self {
            sandbox,
        }
    }

    /// Executes a manifest through the worker.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError`] for sandbox, protocol, and session
    /// failures; step failures terminate the run with a failed result.
    pub fn execute(
        &self,
        input: &ExecutionInput<'_>,
        session: &mut SessionContext,
    ) -> Result<ExecutionResult, ProxyError> {
        let run_started = utc_now_ms();
        let mut child = self.sandbox.launch()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProxyError::SandboxUnavailable("worker stdin missing".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProxyError::SandboxUnavailable("worker stdout missing".to_string()))?;
        let receiver = spawn_reader(stdout);
        let mut link = WorkerLink {
            stdin,
            receiver,
        };

        let outcome = self.drive(input, session, &mut link);
        match outcome {
            Ok(mut result) => {
                let _ = link.send(&HostCommand::Cleanup);
                let _ = child.wait();
                result.totals.duration_ms =
                    u64::try_from(utc_now_ms() - run_started).unwrap_or_default();
                session.set_secret_map(SecretMap::default());
                session
                    .close(result.status, result.totals)
                    .map_err(ExecutionError::from)?;
                Ok(result)
            }
            Err(err) => {
                // Partial artifacts are preserved; the worker is reaped.
                let _ = child.kill();
                let _ = child.wait();
                let totals = RunTotals {
                    duration_ms: u64::try_from(utc_now_ms() - run_started).unwrap_or_default(),
                    ..RunTotals::default()
                };
                session.set_secret_map(SecretMap::default());
                session
                    .close(RunStatus::Failed, totals)
                    .map_err(ExecutionError::from)?;
                Err(err)
            }
        }
    }

    /// Runs prepare and the step loop against a live worker link.
    fn drive(
        &self,
        input: &ExecutionInput<'_>,
        session: &mut SessionContext,
        link: &mut WorkerLink,
    ) -> Result<ExecutionResult, ProxyError> {
        let manifest_value = serde_json::to_value(input.manifest)
            .map_err(|err| ProxyError::Protocol(err.to_string()))?;
        link.send(&HostCommand::Prepare {
            session_id: session.session_id().as_str().to_string(),
            manifest: manifest_value,
            artifacts_dir: session.paths().artifacts_dir.display().to_string(),
        })?;
        self.await_ready(session, link)?;

        let mut totals = RunTotals::default();
        let mut failed_step = None;
        for step in &input.manifest.pipeline.steps {
            if failed_step.is_some() {
                break;
            }
            if session.cancelled() {
                let _ = link.send(&HostCommand::Cancel {
                    step_id: None,
                });
                return Ok(ExecutionResult {
                    status: RunStatus::Cancelled,
                    totals,
                    failed_step,
                });
            }
            let secret_map = input.secret_maps.get(&step.id).cloned().unwrap_or_default();
            session.set_secret_map(secret_map);
            let mut fields = BTreeMap::new();
            fields.insert("step_id".to_string(), Value::String(step.id.clone()));
            fields.insert("driver".to_string(), Value::String(step.driver.clone()));
            session
                .append_event("step_start", fields)
                .map_err(ExecutionError::from)?;

            let config = read_config(input, &step.cfg_path)?;
            link.send(&HostCommand::ExecStep {
                step_id: step.id.clone(),
                driver: step.driver.clone(),
                config,
                inputs: Value::Object(serde_json::Map::new()),
            })?;
            let budget = Duration::from_secs(
                input
                    .step_timeouts
                    .get(&step.id)
                    .copied()
                    .unwrap_or(DEFAULT_STEP_TIMEOUT_SECS),
            );
            match self.pump_step(session, link, &step.id, budget)? {
                StepOutcome::Completed {
                    rows,
                    duration_ms,
                } => {
                    totals.rows += rows;
                    totals.steps_completed += 1;
                    let mut fields = BTreeMap::new();
                    fields.insert("step_id".to_string(), Value::String(step.id.clone()));
                    fields.insert("rows".to_string(), Value::from(rows));
                    fields.insert("duration_ms".to_string(), Value::from(duration_ms));
                    session
                        .append_event("step_complete", fields)
                        .map_err(ExecutionError::from)?;
                }
                StepOutcome::Failed {
                    kind,
                    message,
                } => {
                    totals.steps_failed += 1;
                    let mut fields = BTreeMap::new();
                    fields.insert("step_id".to_string(), Value::String(step.id.clone()));
                    fields.insert("kind".to_string(), Value::String(kind));
                    fields.insert("message".to_string(), Value::String(message));
                    session
                        .append_event("step_failed", fields)
                        .map_err(ExecutionError::from)?;
                    let _ = link.send(&HostCommand::Cancel {
                        step_id: None,
                    });
                    failed_step = Some(step.id.clone());
                }
            }
        }
        let status = if failed_step.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        Ok(ExecutionResult {
            status,
            totals,
            failed_step,
        })
    }

    /// Waits for the worker's ready message within the bring-up budget.
    fn await_ready(
        &self,
        session: &mut SessionContext,
        link: &mut WorkerLink,
    ) -> Result<(), ProxyError> {
        let deadline = Instant::now() + SANDBOX_READY_TIMEOUT;
        loop {
            match link.recv_until(deadline) {
                Ok(WorkerMessage::Ready { .. }) => return Ok(()),
                Ok(message) => {
                    self.passthrough(session, message)?;
                }
                Err(RecvKind::Timeout) => {
                    return Err(ProxyError::SandboxUnavailable(format!(
                        "worker not ready within {}s",
                        SANDBOX_READY_TIMEOUT.as_secs()
                    )));
                }
                Err(RecvKind::Closed) => {
                    return Err(ProxyError::RemoteCrashed(
                        "worker exited before ready".to_string(),
                    ));
                }
            }
        }
    }

    /// Pumps messages for one step until completion, failure, or timeout.
    fn pump_step(
        &self,
        session: &mut SessionContext,
        link: &mut WorkerLink,
        step_id: &str,
        budget: Duration,
    ) -> Result<StepOutcome, ProxyError> {
        let deadline = Instant::now() + budget;
        loop {
            match link.recv_until(deadline) {
                Ok(WorkerMessage::StepComplete {
                    step_id: done,
                    rows,
                    duration_ms,
                }) if done == step_id => {
                    session
                        .append_metric(step_id, "row_count", Value::from(rows), BTreeMap::new())
                        .map_err(ExecutionError::from)?;
                    session
                        .append_metric(
                            step_id,
                            "duration_ms",
                            Value::from(duration_ms),
                            BTreeMap::new(),
                        )
                        .map_err(ExecutionError::from)?;
                    return Ok(StepOutcome::Completed {
                        rows,
                        duration_ms,
                    });
                }
                Ok(WorkerMessage::Error {
                    step_id: failed,
                    kind,
                    message,
                }) if failed.as_deref() == Some(step_id) || failed.is_none() => {
                    return Ok(StepOutcome::Failed {
                        kind,
                        message,
                    });
                }
                Ok(message) => {
                    self.passthrough(session, message)?;
                }
                Err(RecvKind::Timeout) => {
                    let _ = link.send(&HostCommand::Cancel {
                        step_id: Some(step_id.to_string()),
                    });
                    return Err(ProxyError::Timeout {
                        step_id: Some(step_id.to_string()),
                        seconds: budget.as_secs(),
                    });
                }
                Err(RecvKind::Closed) => {
                    return Err(ProxyError::RemoteCrashed(format!(
                        "worker exited during step {step_id}"
                    )));
                }
            }
        }
    }

    /// Writes passthrough messages into the session streams.
    fn passthrough(
        &self,
        session: &mut SessionContext,
        message: WorkerMessage,
    ) -> Result<(), ProxyError> {
        match message {
            WorkerMessage::Event {
                name,
                data,
            } => {
                let fields = match data {
                    Value::Object(map) => map.into_iter().collect(),
                    other => {
                        let mut map = BTreeMap::new();
                        map.insert("data".to_string(), other);
                        map
                    }
                };
                session.append_event(&name, fields).map_err(ExecutionError::from)?;
            }
            WorkerMessage::Metric {
                name,
                step_id,
                value,
                tags,
            } => {
                let tags = match tags {
                    Value::Object(map) => map.into_iter().collect(),
                    _ => BTreeMap::new(),
                };
                session
                    .append_metric(&step_id, &name, value, tags)
                    .map_err(ExecutionError::from)?;
            }
            // Unknown and out-of-phase messages are ignored.
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Worker Link
// ============================================================================

/// Per-step outcome reported by the worker.
enum StepOutcome {
    /// Step finished successfully.
    Completed {
        /// Rows moved.
        rows: u64,
        /// Step duration in milliseconds.
        duration_ms: u64,
    },
    /// Step failed.
    Failed {
        /// Failure classification label.
        kind: String,
        /// Redacted message.
        message: String,
    },
}

/// Receive failure classification.
enum RecvKind {
    /// Deadline elapsed.
    Timeout,
    /// Channel closed (worker exited or pipe broke).
    Closed,
}

/// Live stdio link to a worker process.
struct WorkerLink {
    /// Worker stdin for commands.
    stdin: ChildStdin,
    /// Channel of parsed worker messages.
    receiver: Receiver<WorkerMessage>,
}

impl WorkerLink {
    /// Sends one command line.
    fn send(&mut self, command: &HostCommand) -> Result<(), ProxyError> {
        let line = command.encode().map_err(ProxyError::Protocol)?;
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|()| self.stdin.write_all(b"\n"))
            .and_then(|()| self.stdin.flush())
            .map_err(|err| ProxyError::RemoteCrashed(format!("worker stdin broke: {err}")))
    }

    /// Receives the next message before the deadline.
    fn recv_until(&self, deadline: Instant) -> Result<WorkerMessage, RecvKind> {
        let now = Instant::now();
        let remaining = deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            return Err(RecvKind::Timeout);
        }
        match self.receiver.recv_timeout(remaining) {
            Ok(message) => Ok(message),
            Err(RecvTimeoutError::Timeout) => Err(RecvKind::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(RecvKind::Closed),
        }
    }
}

/// Reads one step's config file from the build directory.
fn read_config(input: &ExecutionInput<'_>, cfg_path: &str) -> Result<Value, ProxyError> {
    let path = input.build_dir.join(cfg_path);
    let bytes = std::fs::read(&path)
        .map_err(|err| ProxyError::Protocol(format!("config read failed: {err}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| ProxyError::Protocol(format!("config parse failed: {err}")))
}

/// Spawns the stdout reader thread feeding the message channel.
fn spawn_reader(stdout: std::process::ChildStdout) -> Receiver<WorkerMessage> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            // Unparseable lines are treated as unknown message types.
            let message = serde_json::from_str::<WorkerMessage>(&line)
                .unwrap_or(WorkerMessage::Unknown);
            if sender.send(message).is_err() {
                break;
            }
        }
    });
    receiver
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
