// crates/osiris-mcp/src/telemetry/tests.rs
// ============================================================================
// Module: Telemetry Tests
// Description: Unit tests for metric labels and event serialization.
// Purpose: Pin the stable label set operators rely on.
// Dependencies: osiris-mcp
// ============================================================================

//! ## Overview
//! Validates method labels and the JSON shape of request events.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::McpMethod;
use super::NoopMetrics;
use super::RequestEvent;
use super::ServerMetrics;

// ============================================================================
// SECTION: Labels
// ============================================================================

#[test]
fn method_labels_are_stable() {
    assert_eq!(McpMethod::ToolsList.as_str(), "tools/list");
    assert_eq!(McpMethod::ToolsCall.as_str(), "tools/call");
    assert_eq!(McpMethod::Initialize.as_str(), "initialize");
}

#[test]
fn events_serialize_without_empty_optionals() {
    let event = RequestEvent {
        method: McpMethod::ToolsList,
        tool: None,
        ok: true,
        error_code: None,
        correlation_id: None,
        latency_ms: 4,
    };
    let line = serde_json::to_string(&event).expect("encode");
    assert!(!line.contains("tool"));
    assert!(!line.contains("error_code"));
    NoopMetrics.record(&event);
}
