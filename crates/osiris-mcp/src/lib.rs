// crates/osiris-mcp/src/lib.rs
// ============================================================================
// Module: Osiris MCP Library
// Description: Public API surface for the MCP server and CLI bridge.
// Purpose: Expose the server, tool router, bridge, telemetry, resources.
// Dependencies: crate::{bridge, resources, server, telemetry, tools}
// ============================================================================

//! ## Overview
//! The MCP server is a stdio JSON-RPC 2.0 endpoint exposing ten tools to
//! LLM clients. Its security invariant: the server process never reads
//! secret environment variables, never resolves `${VAR}` placeholders, and
//! never holds secret values. Every secret-touching tool delegates to an
//! `osiris` CLI subprocess through the bridge, which maps exit codes to
//! error families, caps payload sizes, and stamps correlation ids.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bridge;
pub mod resources;
pub mod server;
pub mod telemetry;
pub mod tools;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bridge::BridgeError;
pub use bridge::BridgeFamily;
pub use bridge::BridgeOutcome;
pub use bridge::CliBridge;
pub use server::McpServer;
pub use server::McpServerError;
pub use server::SelftestReport;
pub use telemetry::NoopMetrics;
pub use telemetry::ServerMetrics;
pub use telemetry::StderrMetrics;
pub use tools::ToolError;
pub use tools::ToolName;
pub use tools::ToolRouter;
