// crates/osiris-core/src/interfaces/mod.rs
// ============================================================================
// Module: Osiris Interfaces
// Description: Backend-agnostic seams for drivers and run-scoped context.
// Purpose: Define the capability surface external drivers implement.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The core treats database and filesystem drivers as opaque capabilities.
//! A driver receives its already-validated step config, an input map, and a
//! [`RunContext`] for telemetry; it returns row counts and named outputs or
//! a structured error. Implementations must be deterministic with respect to
//! their inputs and must not write outside paths obtained from the context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::events::EventError;
use crate::core::identifiers::StepId;

// ============================================================================
// SECTION: Run Context
// ============================================================================

/// Errors raised by run-context operations.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Record encoding failed.
    #[error(transparent)]
    Encode(#[from] EventError),
    /// Stream or artifact I/O failed.
    #[error("session i/o failed: {0}")]
    Io(String),
}

/// Run-scoped capability surface offered to drivers.
///
/// The context owns the session's event/metric streams and artifact
/// directory; drivers never open those files themselves.
pub trait RunContext {
    /// Appends a structured event to the session timeline.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when encoding or stream I/O fails.
    fn log_event(
        &mut self,
        event: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<(), ContextError>;

    /// Appends a metric observation for a step.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when encoding or stream I/O fails.
    fn log_metric(
        &mut self,
        step_id: &StepId,
        metric: &str,
        value: Value,
        tags: BTreeMap<String, Value>,
    ) -> Result<(), ContextError>;

    /// Returns an absolute path for a step artifact, creating the step's
    /// artifact directory lazily.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the directory cannot be created.
    fn artifact_path(&mut self, step_id: &StepId, name: &str) -> Result<PathBuf, ContextError>;

    /// Returns true when cancellation has been requested.
    ///
    /// Cancellation is advisory; long-running drivers should poll it at
    /// natural batch boundaries.
    fn cancelled(&self) -> bool;
}

// ============================================================================
// SECTION: Driver Capability
// ============================================================================

/// Classification of driver failures.
///
/// # Invariants
/// - Labels are stable for events and the run index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverErrorKind {
    /// Connection establishment or authentication failed.
    Connection,
    /// Query or write operation failed.
    Operation,
    /// Local I/O failed.
    Io,
    /// The step was cancelled.
    Cancelled,
    /// The step exceeded its time budget.
    Timeout,
    /// Any other failure.
    Other,
}

impl DriverErrorKind {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Operation => "operation",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

/// Structured driver failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("driver error ({}): {message}", kind.as_str())]
pub struct DriverError {
    /// Failure classification.
    pub kind: DriverErrorKind,
    /// Human-readable message; must not contain secret values.
    pub message: String,
}

impl DriverError {
    /// Creates a driver error.
    #[must_use]
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Successful step output returned by a driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    /// Rows moved by the step, when the driver counts them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    /// Named outputs made available to dependent steps.
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

/// Executable behavior referenced by a component.
///
/// Implementations are blocking; the execution adapter invokes them on
/// dedicated workers so telemetry pumps stay responsive.
pub trait Driver: Send + Sync {
    /// Runs one step with its validated config and upstream inputs.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the step fails; the adapter marks the
    /// step failed and cancels steps that have not started.
    fn run(
        &self,
        step_id: &StepId,
        config: &Value,
        inputs: &BTreeMap<String, Value>,
        ctx: &mut dyn RunContext,
    ) -> Result<StepOutput, DriverError>;
}
