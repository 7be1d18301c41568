// crates/osiris-runtime/src/session.rs
// ============================================================================
// Module: Session Context
// Description: Owner of one run's event, metric, and log streams.
// Purpose: Provide redacted, monotonic, sorted-key session I/O.
// Dependencies: osiris-config, osiris-core
// ============================================================================

//! ## Overview
//! Exactly one session context owns a run-log directory for its lifetime.
//! Events and metrics append to their JSONL streams in call order with
//! monotonic non-decreasing timestamps and sorted keys; every payload runs
//! through the redaction stack (the active component's secret map plus the
//! global denylist) before it reaches disk. `osiris.log` receives
//! human-readable mirror lines. `status.json` is replaced atomically, and
//! closing the session emits `run_end` and flushes everything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use osiris_config::RunLogPaths;
use osiris_config::contract::ensure_dir;
use osiris_config::contract::replace_file;
use osiris_core::ContextError;
use osiris_core::RunContext;
use osiris_core::RunStatus;
use osiris_core::RunTotals;
use osiris_core::SecretMap;
use osiris_core::SessionEvent;
use osiris_core::SessionId;
use osiris_core::SessionMetric;
use osiris_core::StatusDoc;
use osiris_core::StepId;
use osiris_core::redaction::redact_payload;
use osiris_core::time::MonotonicClock;
use osiris_core::time::format_rfc3339_millis;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Stream or directory I/O failed.
    #[error("session i/o failed for {path}: {message}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },
    /// Record encoding failed.
    #[error("session record encoding failed: {0}")]
    Encode(String),
    /// Artifact name escapes the artifact directory.
    #[error("artifact name {0:?} must not contain path separators")]
    BadArtifactName(String),
}

impl From<SessionError> for ContextError {
    fn from(err: SessionError) -> Self {
        Self::Io(err.to_string())
    }
}

// ============================================================================
// SECTION: Session Context
// ============================================================================

/// Owner of one run-log directory and its streams.
pub struct SessionContext {
    /// Session identifier stamped into every record.
    session_id: SessionId,
    /// Resolved run-log paths.
    paths: RunLogPaths,
    /// Event stream writer.
    events: BufWriter<File>,
    /// Metric stream writer.
    metrics: BufWriter<File>,
    /// Human-readable log writer.
    log: BufWriter<File>,
    /// Monotonic timestamp clamp shared by both streams.
    clock: MonotonicClock,
    /// Secret map of the component currently executing.
    active_secrets: SecretMap,
    /// External cancellation flag.
    cancel_flag: Arc<AtomicBool>,
    /// RFC3339 start timestamp.
    started_at: String,
    /// Start instant in epoch milliseconds.
    started_ms: i64,
}

impl SessionContext {
    /// Creates the run-log directory tree and opens the streams.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when directories cannot be created or a
    /// stream cannot be opened.
    pub fn create(session_id: SessionId, paths: RunLogPaths) -> Result<Self, SessionError> {
        ensure_dir(&paths.dir).map_err(io_from_config)?;
        ensure_dir(&paths.artifacts_dir).map_err(io_from_config)?;
        ensure_dir(&paths.cfg_dir).map_err(io_from_config)?;
        let events = open_stream(&paths.events)?;
        let metrics = open_stream(&paths.metrics)?;
        let log = open_stream(&paths.log)?;
        let mut clock = MonotonicClock::new();
        let started_ms = clock.now();
        let started_at = format_rfc3339_millis(started_ms)
            .map_err(|err| SessionError::Encode(err.to_string()))?;
        Ok(Self {
            session_id,
            paths,
            events,
            metrics,
            log,
            clock,
            active_secrets: SecretMap::default(),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            started_at,
            started_ms,
        })
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the resolved run-log paths.
    #[must_use]
    pub const fn paths(&self) -> &RunLogPaths {
        &self.paths
    }

    /// Returns the RFC3339 start timestamp.
    #[must_use]
    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    /// Returns the start instant in epoch milliseconds.
    #[must_use]
    pub const fn started_ms(&self) -> i64 {
        self.started_ms
    }

    /// Returns a handle used to request cancellation externally.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Sets the secret map applied to subsequent payloads.
    pub fn set_secret_map(&mut self, map: SecretMap) {
        self.active_secrets = map;
    }

    /// Emits the `run_start` event.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the stream write fails.
    pub fn start(&mut self, pipeline_slug: &str, profile: &str) -> Result<(), SessionError> {
        let mut fields = BTreeMap::new();
        fields.insert("pipeline".to_string(), Value::String(pipeline_slug.to_string()));
        fields.insert("profile".to_string(), Value::String(profile.to_string()));
        self.append_event("run_start", fields)
    }

    /// Appends one event with redaction and a monotonic timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when encoding or the write fails.
    pub fn append_event(
        &mut self,
        event: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), SessionError> {
        let ts_ms = self.clock.now();
        let mut payload = Value::Object(fields.into_iter().collect());
        redact_payload(&mut payload, &self.active_secrets);
        let fields = match payload {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        let record = SessionEvent {
            ts_ms,
            session: self.session_id.as_str().to_string(),
            event: event.to_string(),
            fields,
        };
        let line = record.encode().map_err(|err| SessionError::Encode(err.to_string()))?;
        write_line(&mut self.events, &self.paths.events, &line)?;
        self.mirror_log(ts_ms, event)
    }

    /// Appends one metric with redaction and a monotonic timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when encoding or the write fails.
    pub fn append_metric(
        &mut self,
        step_id: &str,
        metric: &str,
        value: Value,
        tags: BTreeMap<String, Value>,
    ) -> Result<(), SessionError> {
        let ts_ms = self.clock.now();
        let mut tag_payload = Value::Object(tags.into_iter().collect());
        redact_payload(&mut tag_payload, &self.active_secrets);
        let tags = match tag_payload {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        let record = SessionMetric {
            ts_ms,
            session: self.session_id.as_str().to_string(),
            step_id: step_id.to_string(),
            metric: metric.to_string(),
            value,
            tags,
        };
        let line = record.encode().map_err(|err| SessionError::Encode(err.to_string()))?;
        write_line(&mut self.metrics, &self.paths.metrics, &line)
    }

    /// Atomically replaces `status.json`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when serialization or the write fails.
    pub fn write_status(
        &mut self,
        status: RunStatus,
        totals: RunTotals,
    ) -> Result<(), SessionError> {
        let ended_at = if status.is_terminal() {
            let ts = self.clock.now();
            Some(format_rfc3339_millis(ts).map_err(|err| SessionError::Encode(err.to_string()))?)
        } else {
            None
        };
        let doc = StatusDoc {
            status,
            session_id: self.session_id.as_str().to_string(),
            started_at: self.started_at.clone(),
            ended_at,
            totals,
        };
        let mut bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|err| SessionError::Encode(err.to_string()))?;
        bytes.push(b'\n');
        replace_file(&self.paths.status, &bytes).map_err(io_from_config)
    }

    /// Emits `run_end`, writes the terminal status, and flushes streams.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when any write or flush fails.
    pub fn close(&mut self, status: RunStatus, totals: RunTotals) -> Result<(), SessionError> {
        let mut fields = BTreeMap::new();
        fields.insert("status".to_string(), Value::String(status.as_str().to_string()));
        fields.insert("rows".to_string(), Value::from(totals.rows));
        fields.insert("duration_ms".to_string(), Value::from(totals.duration_ms));
        self.append_event("run_end", fields)?;
        self.write_status(status, totals)?;
        self.events.flush().map_err(|err| io_err(&self.paths.events, &err))?;
        self.metrics.flush().map_err(|err| io_err(&self.paths.metrics, &err))?;
        self.log.flush().map_err(|err| io_err(&self.paths.log, &err))?;
        Ok(())
    }

    /// Writes a mirror line into `osiris.log`.
    fn mirror_log(&mut self, ts_ms: i64, event: &str) -> Result<(), SessionError> {
        let ts = format_rfc3339_millis(ts_ms).unwrap_or_default();
        let line = format!("{ts} INFO {event}");
        write_line(&mut self.log, &self.paths.log, &line)
    }
}

impl RunContext for SessionContext {
    fn log_event(
        &mut self,
        event: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), ContextError> {
        self.append_event(event, fields).map_err(ContextError::from)
    }

    fn log_metric(
        &mut self,
        step_id: &StepId,
        metric: &str,
        value: Value,
        tags: BTreeMap<String, Value>,
    ) -> Result<(), ContextError> {
        self.append_metric(step_id.as_str(), metric, value, tags).map_err(ContextError::from)
    }

    fn artifact_path(&mut self, step_id: &StepId, name: &str) -> Result<PathBuf, ContextError> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ContextError::Io(
                SessionError::BadArtifactName(name.to_string()).to_string(),
            ));
        }
        let dir = self.paths.artifacts_dir.join(step_id.as_str());
        ensure_dir(&dir).map_err(|err| ContextError::Io(err.to_string()))?;
        Ok(dir.join(name))
    }

    fn cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }
}

// ============================================================================
// SECTION: Stream Helpers
// ============================================================================

/// Opens one append-mode stream writer.
fn open_stream(path: &std::path::Path) -> Result<BufWriter<File>, SessionError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| io_err(path, &err))?;
    Ok(BufWriter::new(file))
}

/// Writes one line (with trailing LF) and flushes the stream.
fn write_line(
    writer: &mut BufWriter<File>,
    path: &std::path::Path,
    line: &str,
) -> Result<(), SessionError> {
    writer
        .write_all(line.as_bytes())
        .and_then(|()| writer.write_all(b"\n"))
        .and_then(|()| writer.flush())
        .map_err(|err| io_err(path, &err))
}

/// Builds an I/O error for a path.
fn io_err(path: &std::path::Path, err: &std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Converts a contract error into a session I/O error.
fn io_from_config(err: osiris_config::ConfigError) -> SessionError {
    SessionError::Io {
        path: PathBuf::new(),
        message: err.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
