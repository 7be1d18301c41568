// crates/osiris-mcp/src/server/tests.rs
// ============================================================================
// Module: MCP Server Tests
// Description: Unit tests for the stdio JSON-RPC loop and selftest.
// Purpose: Validate request handling, error envelopes, and the handshake.
// Dependencies: osiris-mcp, tempfile
// ============================================================================

//! ## Overview
//! Drives the server through in-memory stdio buffers: the initialize
//! handshake, tool listing and calls (including alias names), resource
//! reads, malformed request envelopes, and the sub-two-second selftest
//! that runs with no environment access at all.

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

use std::fs;
use std::io::BufReader;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use osiris_config::FilesystemConfig;
use osiris_config::FilesystemContract;
use osiris_config::OsirisConfig;
use osiris_registry::Registry;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

use super::McpServer;
use crate::bridge::CliBridge;
use crate::telemetry::RequestEvent;
use crate::telemetry::ServerMetrics;
use crate::tools::ToolRouter;

/// Metrics sink recording every event.
#[derive(Default)]
struct RecordingMetrics {
    /// Recorded events.
    events: Mutex<Vec<RequestEvent>>,
}

impl ServerMetrics for RecordingMetrics {
    fn record(&self, event: &RequestEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
    }
}

/// Builds a server over a temp workspace.
fn sample_server() -> (TempDir, McpServer, Arc<RecordingMetrics>) {
    let base = tempfile::tempdir().expect("tempdir");
    let config = OsirisConfig {
        filesystem: FilesystemConfig {
            base_path: base.path().display().to_string(),
            ..FilesystemConfig::default()
        },
        ..OsirisConfig::default()
    };
    let contract = FilesystemContract::load(config).expect("contract");
    let components = base.path().join("components");
    fs::create_dir_all(&components).expect("components");
    let registry = Registry::load(&components).expect("registry");
    let bridge = CliBridge::new(PathBuf::from("/bin/true"));
    let router = ToolRouter::new(contract.clone(), registry, bridge);
    let metrics = Arc::new(RecordingMetrics::default());
    let sink: Arc<dyn ServerMetrics> = Arc::clone(&metrics) as Arc<dyn ServerMetrics>;
    let server = McpServer::new(router, contract, sink);
    (base, server, metrics)
}

/// Sends one request line and parses the single response.
fn roundtrip(server: &McpServer, request: &Value) -> Value {
    let mut reader = BufReader::new(Cursor::new(format!("{request}\n")));
    let mut output = Vec::new();
    server.serve_stdio(&mut reader, &mut output).expect("serve");
    let text = String::from_utf8(output).expect("utf8");
    serde_json::from_str(text.trim()).expect("response json")
}

// ============================================================================
// SECTION: Handshake & Listing
// ============================================================================

#[test]
fn initialize_reports_protocol_and_server_info() {
    let (_base, server, _metrics) = sample_server();
    let response = roundtrip(
        &server,
        &json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    );
    assert_eq!(response["result"]["protocolVersion"], json!(super::PROTOCOL_VERSION));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("osiris-mcp"));
}

#[test]
fn tools_list_returns_ten_tools() {
    let (_base, server, _metrics) = sample_server();
    let response =
        roundtrip(&server, &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}));
    assert_eq!(response["result"]["tools"].as_array().expect("tools").len(), 10);
}

// ============================================================================
// SECTION: Tool Calls
// ============================================================================

#[test]
fn tools_call_accepts_dot_aliases() {
    let (_base, server, _metrics) = sample_server();
    let response = roundtrip(
        &server,
        &json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "osiris.oml.schema.get", "arguments": {}},
        }),
    );
    let schema = &response["result"]["content"][0]["json"];
    assert_eq!(schema["$id"], json!("osiris://mcp/schemas/oml"));
}

#[test]
fn tool_errors_carry_family_metadata() {
    let (_base, server, _metrics) = sample_server();
    let response = roundtrip(
        &server,
        &json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": {"name": "memory_capture", "arguments": {"session": "s1", "note": {}}},
        }),
    );
    assert_eq!(response["error"]["data"]["family"], json!("SECURITY"));
}

// ============================================================================
// SECTION: Envelope Errors
// ============================================================================

#[test]
fn parse_errors_return_code_32700() {
    let (_base, server, _metrics) = sample_server();
    let mut reader = BufReader::new(Cursor::new("this is not json\n"));
    let mut output = Vec::new();
    server.serve_stdio(&mut reader, &mut output).expect("serve");
    let response: Value =
        serde_json::from_str(String::from_utf8(output).expect("utf8").trim()).expect("json");
    assert_eq!(response["error"]["code"], json!(-32700));
}

#[test]
fn wrong_version_and_unknown_method_are_rejected() {
    let (_base, server, _metrics) = sample_server();
    let bad_version =
        roundtrip(&server, &json!({"jsonrpc": "1.0", "id": 5, "method": "tools/list"}));
    assert_eq!(bad_version["error"]["code"], json!(-32600));
    let unknown =
        roundtrip(&server, &json!({"jsonrpc": "2.0", "id": 6, "method": "tools/destroy"}));
    assert_eq!(unknown["error"]["code"], json!(-32601));
}

// ============================================================================
// SECTION: Resources
// ============================================================================

#[test]
fn resources_round_trip_through_the_server() {
    let (_base, server, _metrics) = sample_server();
    let listing =
        roundtrip(&server, &json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"}));
    assert!(listing["result"]["resources"].as_array().expect("resources").len() >= 4);
    let read = roundtrip(
        &server,
        &json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "resources/read",
            "params": {"uri": "osiris://mcp/prompts/guide"},
        }),
    );
    assert!(read["result"]["text"].as_str().expect("text").contains("Osiris pipeline"));
}

// ============================================================================
// SECTION: Selftest & Telemetry
// ============================================================================

#[test]
fn selftest_enumerates_ten_tools_quickly() {
    let (_base, server, _metrics) = sample_server();
    let report = server.selftest();
    assert_eq!(report.tool_count, 10);
    assert_eq!(report.protocol_version, super::PROTOCOL_VERSION);
    assert!(Duration::from_millis(report.duration_ms) < Duration::from_secs(2));
}

#[test]
fn every_request_is_reported_to_metrics() {
    let (_base, server, metrics) = sample_server();
    let _ = roundtrip(&server, &json!({"jsonrpc": "2.0", "id": 9, "method": "tools/list"}));
    let events = metrics.events.lock().expect("events");
    assert_eq!(events.len(), 1);
    assert!(events[0].ok);
}
