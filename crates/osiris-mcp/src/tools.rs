// crates/osiris-mcp/src/tools.rs
// ============================================================================
// Module: MCP Tool Router
// Description: Tool registry, alias normalization, and request dispatch.
// Purpose: Serve read-only tools locally and delegate secret-touching ones.
// Dependencies: osiris-compiler, osiris-config, osiris-registry
// ============================================================================

//! ## Overview
//! Ten tools make up the surface. Canonical names use underscores;
//! dot-form aliases (`connections.list`, `osiris.connections.list`)
//! normalize to the canonical name. Tools that can touch secrets
//! (`connections_list`, `connections_doctor`, `discovery_request`) are
//! implemented exclusively by delegating to `osiris … --json` subprocesses
//! through the CLI bridge; the router itself never reads environment
//! variables or connection files. The remaining tools are read-only views
//! over the registry, the embedded schemas, and contract-resolved files.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;

use osiris_compiler::OmlDocument;
use osiris_compiler::validate_pipeline;
use osiris_config::FilesystemContract;
use osiris_config::contract::ensure_dir;
use osiris_registry::Registry;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::bridge::CliBridge;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Embedded OML JSON schema served by `oml_schema_get`.
pub const OML_SCHEMA: &str = include_str!("../assets/oml.schema.json");
/// Embedded authoring guide served by `guide_start`.
pub const GUIDE_TEXT: &str = include_str!("../assets/guide.md");
/// Embedded usecase catalog served by `usecases_list`.
pub const USECASES: &str = include_str!("../assets/usecases.json");

// ============================================================================
// SECTION: Tool Names
// ============================================================================

/// The canonical tool surface.
///
/// # Invariants
/// - Canonical names are underscore-separated and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// List configured connections (delegated; secret-aware).
    ConnectionsList,
    /// Probe connection health (delegated; secret-aware).
    ConnectionsDoctor,
    /// List registry components.
    ComponentsList,
    /// Request schema discovery from a source (delegated; secret-aware).
    DiscoveryRequest,
    /// Return the OML JSON schema.
    OmlSchemaGet,
    /// Validate an OML document.
    OmlValidate,
    /// Save a validated OML document.
    OmlSave,
    /// Return the authoring guide.
    GuideStart,
    /// Capture a session memory note (requires consent).
    MemoryCapture,
    /// List the usecase catalog.
    UsecasesList,
}

impl ToolName {
    /// All tools in canonical order.
    pub const ALL: &'static [Self] = &[
        Self::ConnectionsList,
        Self::ConnectionsDoctor,
        Self::ComponentsList,
        Self::DiscoveryRequest,
        Self::OmlSchemaGet,
        Self::OmlValidate,
        Self::OmlSave,
        Self::GuideStart,
        Self::MemoryCapture,
        Self::UsecasesList,
    ];

    /// Returns the canonical underscore name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionsList => "connections_list",
            Self::ConnectionsDoctor => "connections_doctor",
            Self::ComponentsList => "components_list",
            Self::DiscoveryRequest => "discovery_request",
            Self::OmlSchemaGet => "oml_schema_get",
            Self::OmlValidate => "oml_validate",
            Self::OmlSave => "oml_save",
            Self::GuideStart => "guide_start",
            Self::MemoryCapture => "memory_capture",
            Self::UsecasesList => "usecases_list",
        }
    }

    /// Parses a canonical name or dot-form alias.
    ///
    /// `connections.list` and `osiris.connections.list` both resolve to
    /// `connections_list`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.replace('.', "_");
        let normalized = normalized.strip_prefix("osiris_").unwrap_or(&normalized);
        Self::ALL.iter().copied().find(|tool| tool.as_str() == normalized)
    }

    /// Returns a one-line tool description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ConnectionsList => "List configured connections with secrets redacted",
            Self::ConnectionsDoctor => "Probe connection health (delegated to the CLI)",
            Self::ComponentsList => "List available components and their modes",
            Self::DiscoveryRequest => "Request source schema discovery (delegated to the CLI)",
            Self::OmlSchemaGet => "Return the OML JSON schema",
            Self::OmlValidate => "Validate an OML document against the registry",
            Self::OmlSave => "Validate and save an OML document",
            Self::GuideStart => "Return the pipeline authoring guide",
            Self::MemoryCapture => "Capture a session memory note (requires consent)",
            Self::UsecasesList => "List the usecase catalog",
        }
    }

    /// Returns true when the tool must delegate to the CLI bridge.
    #[must_use]
    pub const fn is_delegated(self) -> bool {
        matches!(self, Self::ConnectionsList | Self::ConnectionsDoctor | Self::DiscoveryRequest)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by tool dispatch.
///
/// # Invariants
/// - Variants map to stable JSON-RPC codes and family labels.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Unknown tool name after alias normalization.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Arguments failed validation.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// Request or response exceeded the payload cap.
    #[error("payload too large (cap {cap} bytes)")]
    PayloadTooLarge {
        /// Configured cap.
        cap: usize,
    },
    /// Consent or confinement violation.
    #[error("security violation: {0}")]
    Security(String),
    /// Delegated CLI call failed at the bridge layer.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// Internal failure.
    #[error("internal tool failure: {0}")]
    Internal(String),
}

impl ToolError {
    /// Returns the JSON-RPC error code for this error.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::UnknownTool(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::PayloadTooLarge {
                ..
            } => -32010,
            Self::Security(_) => -32020,
            Self::Bridge(_) => -32030,
            Self::Internal(_) => -32603,
        }
    }

    /// Returns the family label for this error.
    #[must_use]
    pub const fn family(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) | Self::InvalidParams(_) => "SCHEMA",
            Self::PayloadTooLarge {
                ..
            } => "POLICY",
            Self::Security(_) => "SECURITY",
            Self::Bridge(_) => "PLATFORM",
            Self::Internal(_) => "PLATFORM",
        }
    }
}

// ============================================================================
// SECTION: Tool Definitions
// ============================================================================

/// Tool definition served by `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Canonical tool name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Input schema (permissive object schema).
    pub input_schema: Value,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Dispatches tool calls over the registry, contract, and bridge.
pub struct ToolRouter {
    /// Path resolution authority.
    contract: FilesystemContract,
    /// Component registry.
    registry: Registry,
    /// CLI bridge for delegated tools.
    bridge: CliBridge,
}

impl ToolRouter {
    /// Creates a router.
    #[must_use]
    pub const fn new(contract: FilesystemContract, registry: Registry, bridge: CliBridge) -> Self {
        Self {
            contract,
            registry,
            bridge,
        }
    }

    /// Returns every tool definition in canonical order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        ToolName::ALL
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.as_str(),
                description: tool.description(),
                input_schema: json!({"type": "object"}),
            })
            .collect()
    }

    /// Dispatches one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] for unknown tools, invalid params, oversize
    /// payloads, security violations, and bridge failures.
    pub fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let tool =
            ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let size = serde_json::to_vec(arguments).map(|bytes| bytes.len()).unwrap_or(0);
        if size > self.bridge.payload_cap() {
            return Err(ToolError::PayloadTooLarge {
                cap: self.bridge.payload_cap(),
            });
        }
        match tool {
            ToolName::ConnectionsList => self.delegate(&["connections", "list", "--json"], None),
            ToolName::ConnectionsDoctor => self.connections_doctor(arguments),
            ToolName::DiscoveryRequest => {
                let payload = serde_json::to_vec(arguments)
                    .map_err(|err| ToolError::Internal(err.to_string()))?;
                self.delegate(&["mcp", "discovery_request", "--json"], Some(&payload))
            }
            ToolName::ComponentsList => self.components_list(),
            ToolName::OmlSchemaGet => serde_json::from_str(OML_SCHEMA)
                .map_err(|err| ToolError::Internal(err.to_string())),
            ToolName::OmlValidate => self.oml_validate(arguments),
            ToolName::OmlSave => self.oml_save(arguments),
            ToolName::GuideStart => Ok(json!({"guide": GUIDE_TEXT})),
            ToolName::MemoryCapture => self.memory_capture(arguments),
            ToolName::UsecasesList => serde_json::from_str(USECASES)
                .map_err(|err| ToolError::Internal(err.to_string())),
        }
    }

    /// Runs a delegated CLI call and wraps its outcome.
    fn delegate(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<Value, ToolError> {
        let outcome = self.bridge.run_cli_json(args, stdin)?;
        serde_json::to_value(&outcome).map_err(|err| ToolError::Internal(err.to_string()))
    }

    /// Delegates `connections_doctor` with optional family/alias filters.
    fn connections_doctor(&self, arguments: &Value) -> Result<Value, ToolError> {
        let mut args: Vec<String> =
            vec!["connections".to_string(), "doctor".to_string(), "--json".to_string()];
        if let Some(family) = arguments.get("family").and_then(Value::as_str) {
            validate_token(family)?;
            args.push("--family".to_string());
            args.push(family.to_string());
        }
        if let Some(alias) = arguments.get("alias").and_then(Value::as_str) {
            validate_token(alias)?;
            args.push("--alias".to_string());
            args.push(alias.to_string());
        }
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.delegate(&borrowed, None)
    }

    /// Lists registry components with modes and versions.
    fn components_list(&self) -> Result<Value, ToolError> {
        let specs =
            self.registry.list(None).map_err(|err| ToolError::Internal(err.to_string()))?;
        let components: Vec<Value> = specs
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name.as_str(),
                    "version": spec.version,
                    "modes": spec.modes,
                })
            })
            .collect();
        Ok(json!({"components": components}))
    }

    /// Validates an OML document from `arguments.oml`.
    fn oml_validate(&self, arguments: &Value) -> Result<Value, ToolError> {
        let oml = arguments
            .get("oml")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("oml string required".to_string()))?;
        let doc = match OmlDocument::parse(oml.as_bytes()) {
            Ok(doc) => doc,
            Err(err) => {
                return Ok(json!({"valid": false, "issues": [{
                    "id": "OML001",
                    "path": "",
                    "message": err.to_string(),
                }]}));
            }
        };
        match validate_pipeline(&doc, &self.registry) {
            Ok(pipeline) => Ok(json!({
                "valid": true,
                "pipeline": pipeline.slug.as_str(),
                "steps": pipeline.steps.len(),
            })),
            Err(issues) => Ok(json!({"valid": false, "issues": issues})),
        }
    }

    /// Validates then saves an OML document under the pipelines directory.
    fn oml_save(&self, arguments: &Value) -> Result<Value, ToolError> {
        let validation = self.oml_validate(arguments)?;
        if validation.get("valid") != Some(&Value::Bool(true)) {
            return Ok(validation);
        }
        let oml = arguments
            .get("oml")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("oml string required".to_string()))?;
        let name = validation
            .get("pipeline")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Internal("validated pipeline missing slug".to_string()))?;
        let dir = self.contract.pipelines_dir();
        ensure_dir(&dir).map_err(|err| ToolError::Internal(err.to_string()))?;
        let path = dir.join(format!("{name}.yaml"));
        fs::write(&path, oml).map_err(|err| ToolError::Internal(err.to_string()))?;
        Ok(json!({
            "valid": true,
            "saved": true,
            "path": path.display().to_string(),
        }))
    }

    /// Captures a session memory note after explicit consent.
    fn memory_capture(&self, arguments: &Value) -> Result<Value, ToolError> {
        if arguments.get("consent").and_then(Value::as_bool) != Some(true) {
            return Err(ToolError::Security(
                "memory_capture requires consent: true".to_string(),
            ));
        }
        let session = arguments
            .get("session")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams("session string required".to_string()))?;
        validate_token(session)?;
        let note = arguments
            .get("note")
            .cloned()
            .ok_or_else(|| ToolError::InvalidParams("note required".to_string()))?;
        let dir = self
            .contract
            .base_path()
            .join(&self.contract.config().filesystem.sessions_dir)
            .join("memory");
        ensure_dir(&dir).map_err(|err| ToolError::Internal(err.to_string()))?;
        let path = dir.join(format!("{session}.json"));
        let mut notes: Vec<Value> = fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        notes.push(note);
        let rendered = serde_json::to_string_pretty(&notes)
            .map_err(|err| ToolError::Internal(err.to_string()))?;
        fs::write(&path, format!("{rendered}\n"))
            .map_err(|err| ToolError::Internal(err.to_string()))?;
        Ok(json!({"captured": true, "count": notes.len()}))
    }
}

/// Validates a user-supplied path-participating token.
///
/// Only `[a-z0-9_-]` survives; anything else is rejected before it can
/// reach a filesystem path or CLI argument.
fn validate_token(token: &str) -> Result<(), ToolError> {
    let valid = !token.is_empty()
        && token.len() <= 64
        && token
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(ToolError::InvalidParams(format!("invalid token {token:?}")))
    }
}

/// Builds a map of tool name to definition for diagnostics.
#[must_use]
pub fn tool_catalog() -> BTreeMap<&'static str, &'static str> {
    ToolName::ALL.iter().map(|tool| (tool.as_str(), tool.description())).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
