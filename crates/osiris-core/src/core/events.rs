// crates/osiris-core/src/core/events.rs
// ============================================================================
// Module: Osiris Session Records
// Description: JSONL event and metric records plus run status documents.
// Purpose: Guarantee sorted-key, millisecond-precision session streams.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Session streams are newline-delimited JSON with one object per line and
//! keys in sorted order. Records encode through a `BTreeMap` so ordering is
//! a property of the encoder, not of call sites. Timestamps are RFC3339 UTC
//! with millisecond precision; monotonicity is enforced by the stream owner.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::time::TimeError;
use crate::core::time::format_rfc3339_millis;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Terminal and in-flight status of a run.
///
/// # Invariants
/// - Wire labels are stable for the run index and status documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is in flight.
    Running,
    /// Run finished successfully.
    Completed,
    /// Run failed on a step or infrastructure error.
    Failed,
    /// Run was cancelled externally.
    Cancelled,
}

impl RunStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true when the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

// ============================================================================
// SECTION: Totals & Status Document
// ============================================================================

/// Rolled-up totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    /// Total rows moved across all steps.
    pub rows: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Number of steps that completed.
    pub steps_completed: u32,
    /// Number of steps that failed.
    pub steps_failed: u32,
}

/// Contents of a run's `status.json` document.
///
/// # Invariants
/// - `ended_at` is present exactly when `status` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDoc {
    /// Run status.
    pub status: RunStatus,
    /// Session identifier owning the run-log directory.
    pub session_id: String,
    /// RFC3339 start timestamp.
    pub started_at: String,
    /// RFC3339 end timestamp for terminal statuses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Rolled-up totals.
    pub totals: RunTotals,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when encoding session records.
#[derive(Debug, Error)]
pub enum EventError {
    /// Timestamp formatting failed.
    #[error(transparent)]
    Time(#[from] TimeError),
    /// JSON serialization failed.
    #[error("record serialization failed: {0}")]
    Serialize(String),
}

// ============================================================================
// SECTION: Session Event
// ============================================================================

/// One line of a session's `events.jsonl` timeline.
///
/// # Invariants
/// - `ts_ms` is epoch milliseconds; the owner clamps it monotonic.
/// - Payload fields never override the reserved `ts`/`session`/`event` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Event timestamp in epoch milliseconds.
    pub ts_ms: i64,
    /// Owning session identifier.
    pub session: String,
    /// Event name (e.g. `run_start`, `step_complete`).
    pub event: String,
    /// Additional payload fields.
    pub fields: BTreeMap<String, Value>,
}

impl SessionEvent {
    /// Encodes the event as one JSON line with sorted keys (no trailing LF).
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when timestamp formatting or serialization
    /// fails.
    pub fn encode(&self) -> Result<String, EventError> {
        let mut record: BTreeMap<String, Value> = self.fields.clone();
        record.insert("ts".to_string(), Value::String(format_rfc3339_millis(self.ts_ms)?));
        record.insert("session".to_string(), Value::String(self.session.clone()));
        record.insert("event".to_string(), Value::String(self.event.clone()));
        serde_json::to_string(&record).map_err(|err| EventError::Serialize(err.to_string()))
    }
}

// ============================================================================
// SECTION: Session Metric
// ============================================================================

/// One line of a session's `metrics.jsonl` stream.
///
/// # Invariants
/// - Tags never override the reserved record keys.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetric {
    /// Metric timestamp in epoch milliseconds.
    pub ts_ms: i64,
    /// Owning session identifier.
    pub session: String,
    /// Step the metric belongs to.
    pub step_id: String,
    /// Metric name (e.g. `rows_read`, `duration_ms`).
    pub metric: String,
    /// Metric value.
    pub value: Value,
    /// Additional tags.
    pub tags: BTreeMap<String, Value>,
}

impl SessionMetric {
    /// Encodes the metric as one JSON line with sorted keys (no trailing LF).
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when timestamp formatting or serialization
    /// fails.
    pub fn encode(&self) -> Result<String, EventError> {
        let mut record: BTreeMap<String, Value> = self.tags.clone();
        record.insert("ts".to_string(), Value::String(format_rfc3339_millis(self.ts_ms)?));
        record.insert("session".to_string(), Value::String(self.session.clone()));
        record.insert("step_id".to_string(), Value::String(self.step_id.clone()));
        record.insert("metric".to_string(), Value::String(self.metric.clone()));
        record.insert("value".to_string(), self.value.clone());
        serde_json::to_string(&record).map_err(|err| EventError::Serialize(err.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
