// crates/osiris-mcp/src/telemetry.rs
// ============================================================================
// Module: MCP Telemetry
// Description: Observability hooks for server requests and tool routing.
// Purpose: Provide request events without hard observability dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A thin metrics seam: the server reports one event per JSON-RPC request
//! with the method, tool, outcome, correlation id, and latency. The
//! default sink discards events; the stderr sink writes one JSON line per
//! event so operators can pipe server telemetry without configuration.
//! Labels must never contain secret values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;

use serde::Serialize;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// JSON-RPC method classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum McpMethod {
    /// `initialize` handshake.
    Initialize,
    /// `tools/list`.
    ToolsList,
    /// `tools/call`.
    ToolsCall,
    /// `resources/list`.
    ResourcesList,
    /// `resources/read`.
    ResourcesRead,
    /// Malformed JSON-RPC request.
    Invalid,
    /// Unsupported method.
    Other,
}

impl McpMethod {
    /// Returns a stable label for the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::ResourcesList => "resources/list",
            Self::ResourcesRead => "resources/read",
            Self::Invalid => "invalid",
            Self::Other => "other",
        }
    }
}

/// One request telemetry event.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEvent {
    /// Method classification.
    pub method: McpMethod,
    /// Tool name for `tools/call` requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Whether the request succeeded.
    pub ok: bool,
    /// JSON-RPC error code when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    /// Correlation id when a bridge call was involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Request latency in milliseconds.
    pub latency_ms: u64,
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Metrics sink for MCP requests.
pub trait ServerMetrics: Send + Sync {
    /// Records one request event.
    fn record(&self, event: &RequestEvent);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Events are intentionally discarded.
pub struct NoopMetrics;

impl ServerMetrics for NoopMetrics {
    fn record(&self, _event: &RequestEvent) {}
}

/// Stderr metrics sink writing one JSON line per event.
pub struct StderrMetrics;

impl ServerMetrics for StderrMetrics {
    fn record(&self, event: &RequestEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(line.as_bytes());
            let _ = stderr.write_all(b"\n");
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
