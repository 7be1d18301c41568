// crates/osiris-mcp/src/server.rs
// ============================================================================
// Module: MCP Server
// Description: Stdio JSON-RPC 2.0 endpoint exposing the tool surface.
// Purpose: Serve LLM clients with newline-delimited JSON-RPC over stdio.
// Dependencies: osiris-config, crate::{resources, telemetry, tools}
// ============================================================================

//! ## Overview
//! The server reads one JSON-RPC request per stdin line and writes one
//! response per stdout line. Methods: `initialize`, `tools/list`,
//! `tools/call`, `resources/list`, and `resources/read`. Every request is
//! reported to the metrics sink. The selftest performs the handshake and
//! tool enumeration in-process without touching a single environment
//! variable, proving the secret-isolation invariant holds from any
//! working directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::BufRead;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use osiris_config::FilesystemContract;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::resources;
use crate::telemetry::McpMethod;
use crate::telemetry::RequestEvent;
use crate::telemetry::ServerMetrics;
use crate::tools::ToolName;
use crate::tools::ToolRouter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Protocol version reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "osiris-mcp";
/// Maximum accepted request line size in bytes.
pub const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the server loop.
#[derive(Debug, Error)]
pub enum McpServerError {
    /// Stdio transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: JSON-RPC Types
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier.
    #[serde(default)]
    id: Value,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error payload.
#[derive(Debug, Serialize)]
struct JsonRpcError {
    /// Error code.
    code: i64,
    /// Human-readable message.
    message: String,
    /// Structured family metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Tool call parameters.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    /// Tool name (canonical or alias).
    name: String,
    /// Tool arguments.
    #[serde(default)]
    arguments: Value,
}

/// Resource read parameters.
#[derive(Debug, Deserialize)]
struct ResourceReadParams {
    /// Resource URI.
    uri: String,
}

// ============================================================================
// SECTION: Selftest Report
// ============================================================================

/// Outcome of `osiris mcp run --selftest`.
#[derive(Debug, Clone, Serialize)]
pub struct SelftestReport {
    /// Protocol version the handshake reported.
    pub protocol_version: String,
    /// Number of tools enumerated.
    pub tool_count: usize,
    /// Tool names in canonical order.
    pub tools: Vec<&'static str>,
    /// Selftest duration in milliseconds.
    pub duration_ms: u64,
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Stdio JSON-RPC server instance.
pub struct McpServer {
    /// Tool router for request dispatch.
    router: ToolRouter,
    /// Path resolution authority for resources.
    contract: FilesystemContract,
    /// Metrics sink.
    metrics: Arc<dyn ServerMetrics>,
}

impl McpServer {
    /// Creates a server.
    #[must_use]
    pub fn new(
        router: ToolRouter,
        contract: FilesystemContract,
        metrics: Arc<dyn ServerMetrics>,
    ) -> Self {
        Self {
            router,
            contract,
            metrics,
        }
    }

    /// Serves newline-delimited JSON-RPC until stdin closes.
    ///
    /// # Errors
    ///
    /// Returns [`McpServerError`] when the transport fails.
    pub fn serve_stdio(
        &self,
        reader: &mut impl BufRead,
        writer: &mut impl Write,
    ) -> Result<(), McpServerError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|err| McpServerError::Transport(err.to_string()))?;
            if read == 0 {
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }
            if line.len() > MAX_REQUEST_BYTES {
                continue;
            }
            let response = self.handle_line(line.trim());
            let payload = serde_json::to_string(&response)
                .map_err(|err| McpServerError::Transport(err.to_string()))?;
            writer
                .write_all(payload.as_bytes())
                .and_then(|()| writer.write_all(b"\n"))
                .and_then(|()| writer.flush())
                .map_err(|err| McpServerError::Transport(err.to_string()))?;
        }
    }

    /// Handles one raw request line.
    fn handle_line(&self, line: &str) -> JsonRpcResponse {
        let started = Instant::now();
        let Ok(request) = serde_json::from_str::<JsonRpcRequest>(line) else {
            self.record(McpMethod::Invalid, None, false, Some(-32700), started);
            return error_response(Value::Null, -32700, "parse error", None);
        };
        if request.jsonrpc != "2.0" {
            self.record(McpMethod::Invalid, None, false, Some(-32600), started);
            return error_response(request.id, -32600, "invalid json-rpc version", None);
        }
        match request.method.as_str() {
            "initialize" => {
                let result = json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": {
                        "tools": {},
                        "resources": {},
                    },
                });
                self.record(McpMethod::Initialize, None, true, None, started);
                ok_response(request.id, result)
            }
            "tools/list" => {
                let tools = self.router.list_tools();
                self.record(McpMethod::ToolsList, None, true, None, started);
                ok_response(request.id, json!({"tools": tools}))
            }
            "tools/call" => self.handle_tools_call(request.id, request.params, started),
            "resources/list" => {
                let entries = resources::list_resources(&self.contract);
                self.record(McpMethod::ResourcesList, None, true, None, started);
                ok_response(request.id, json!({"resources": entries}))
            }
            "resources/read" => self.handle_resources_read(request.id, request.params, started),
            _ => {
                self.record(McpMethod::Other, None, false, Some(-32601), started);
                error_response(request.id, -32601, "method not found", None)
            }
        }
    }

    /// Handles `tools/call`.
    fn handle_tools_call(
        &self,
        id: Value,
        params: Option<Value>,
        started: Instant,
    ) -> JsonRpcResponse {
        let params = params.unwrap_or(Value::Null);
        let Ok(call) = serde_json::from_value::<ToolCallParams>(params) else {
            self.record(McpMethod::ToolsCall, None, false, Some(-32602), started);
            return error_response(id, -32602, "invalid tool call params", None);
        };
        let tool_label = ToolName::parse(&call.name).map(ToolName::as_str).map(str::to_string);
        match self.router.call(&call.name, &call.arguments) {
            Ok(result) => {
                self.record(McpMethod::ToolsCall, tool_label, true, None, started);
                ok_response(id, json!({"content": [{"type": "json", "json": result}]}))
            }
            Err(err) => {
                let code = err.code();
                self.record(McpMethod::ToolsCall, tool_label, false, Some(code), started);
                // Delegated outcomes embed their correlation id in the
                // payload; bridge transport failures carry none.
                let data = json!({"family": err.family()});
                error_response(id, code, &err.to_string(), Some(data))
            }
        }
    }

    /// Handles `resources/read`.
    fn handle_resources_read(
        &self,
        id: Value,
        params: Option<Value>,
        started: Instant,
    ) -> JsonRpcResponse {
        let params = params.unwrap_or(Value::Null);
        let Ok(read) = serde_json::from_value::<ResourceReadParams>(params) else {
            self.record(McpMethod::ResourcesRead, None, false, Some(-32602), started);
            return error_response(id, -32602, "invalid resource read params", None);
        };
        match resources::read_resource(&self.contract, &read.uri) {
            Ok(result) => {
                self.record(McpMethod::ResourcesRead, None, true, None, started);
                ok_response(id, result)
            }
            Err(err) => {
                self.record(McpMethod::ResourcesRead, None, false, Some(-32602), started);
                error_response(id, -32602, &err.to_string(), None)
            }
        }
    }

    /// Runs the in-process selftest: handshake plus tool enumeration.
    ///
    /// The selftest never reads environment variables and never invokes
    /// the bridge, so it passes with every secret unset.
    #[must_use]
    pub fn selftest(&self) -> SelftestReport {
        let started = Instant::now();
        let handshake = self.handle_line(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}",
        );
        let protocol_version = handshake
            .result
            .as_ref()
            .and_then(|result| result.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let tools = ToolName::ALL.iter().map(|tool| tool.as_str()).collect::<Vec<_>>();
        SelftestReport {
            protocol_version,
            tool_count: tools.len(),
            tools,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Reports one request event to the metrics sink.
    fn record(
        &self,
        method: McpMethod,
        tool: Option<String>,
        ok: bool,
        error_code: Option<i64>,
        started: Instant,
    ) {
        self.metrics.record(&RequestEvent {
            method,
            tool,
            ok,
            error_code,
            correlation_id: None,
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
    }
}

/// Builds a success response.
fn ok_response(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

/// Builds an error response.
fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.to_string(),
            data,
        }),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
