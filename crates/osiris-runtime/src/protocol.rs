// crates/osiris-runtime/src/protocol.rs
// ============================================================================
// Module: Proxy Wire Protocol
// Description: Newline-delimited JSON messages between host and worker.
// Purpose: Define the stable command and message shapes for the proxy.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The transparent-proxy adapter and its worker exchange one JSON object
//! per line over the worker's stdin/stdout, UTF-8 encoded. Commands flow
//! host to worker; messages flow worker to host. Unknown message types are
//! ignored by the host for forward compatibility, and unknown fields pass
//! through both directions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Host Commands
// ============================================================================

/// Commands sent from the host to the proxy worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HostCommand {
    /// Establishes the worker's session scope.
    Prepare {
        /// Session identifier.
        session_id: String,
        /// Compiled manifest document.
        manifest: Value,
        /// Absolute artifact root mounted inside the sandbox.
        artifacts_dir: String,
    },
    /// Executes one step.
    ExecStep {
        /// Step identifier.
        step_id: String,
        /// Driver (component) name.
        driver: String,
        /// Validated step config.
        config: Value,
        /// Upstream outputs known to the host.
        inputs: Value,
    },
    /// Requests cancellation of the in-flight (or all) steps.
    Cancel {
        /// Step to cancel; all when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
    },
    /// Tears the worker down.
    Cleanup,
}

// ============================================================================
// SECTION: Worker Messages
// ============================================================================

/// Messages sent from the proxy worker to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Worker is ready to execute steps.
    Ready {
        /// Session identifier echoed from `prepare`.
        session_id: String,
    },
    /// Transparent event passthrough.
    Event {
        /// Event name.
        name: String,
        /// Event payload fields.
        data: Value,
    },
    /// Transparent metric passthrough.
    Metric {
        /// Metric name.
        name: String,
        /// Step the metric belongs to.
        step_id: String,
        /// Metric value.
        value: Value,
        /// Metric tags.
        tags: Value,
    },
    /// A step finished successfully.
    StepComplete {
        /// Step identifier.
        step_id: String,
        /// Rows moved.
        rows: u64,
        /// Step duration in milliseconds.
        duration_ms: u64,
    },
    /// A step or the worker failed.
    Error {
        /// Step identifier, when step-scoped.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        /// Failure classification label.
        kind: String,
        /// Redacted human-readable message.
        message: String,
    },
    /// Any message type this host version does not know.
    #[serde(other)]
    Unknown,
}

impl WorkerMessage {
    /// Encodes the message as one JSON line (no trailing LF).
    ///
    /// # Errors
    ///
    /// Returns the serialization error message when encoding fails.
    pub fn encode(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|err| err.to_string())
    }
}

impl HostCommand {
    /// Encodes the command as one JSON line (no trailing LF).
    ///
    /// # Errors
    ///
    /// Returns the serialization error message when encoding fails.
    pub fn encode(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|err| err.to_string())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
