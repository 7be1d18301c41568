// crates/osiris-cli/src/connections.rs
// ============================================================================
// Module: Connection Resolution
// Description: Connection catalog loading and env interpolation.
// Purpose: Keep the only secret-resolving code path inside the CLI.
// Dependencies: osiris-core, serde_yaml
// ============================================================================

//! ## Overview
//! Connections live in `osiris_connections.yaml` as a map of family to
//! alias to config, with secret fields holding `${VAR}` placeholders. This
//! module is the only place in the workspace where those placeholders
//! resolve against the process environment. Everything returned to callers
//! that might be printed or logged is redacted first; `doctor` reports
//! which variables resolve without ever echoing their values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use osiris_core::redaction;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Connection catalog filename.
pub const CONNECTIONS_FILE: &str = "osiris_connections.yaml";
/// Maximum accepted catalog size in bytes.
const MAX_CATALOG_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Catalog file could not be read.
    #[error("connections catalog unreadable: {0}")]
    Io(String),
    /// Catalog parsing failed.
    #[error("connections catalog invalid: {0}")]
    Parse(String),
    /// A referenced environment variable is unset.
    #[error("environment variable {0} is not set")]
    #[allow(dead_code, reason = "constructed by resolve_env, exercised via unit tests; no production caller yet")]
    MissingEnv(String),
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Parsed connection catalog: family, then alias, then config.
pub type Catalog = BTreeMap<String, BTreeMap<String, Value>>;

/// Loads the catalog from `<base>/osiris_connections.yaml`.
///
/// A missing file yields an empty catalog; an unreadable or oversized one
/// fails.
///
/// # Errors
///
/// Returns [`ConnectionError`] on read or parse failure.
pub fn load_catalog(base: &Path) -> Result<Catalog, ConnectionError> {
    let path = base.join(CONNECTIONS_FILE);
    if !path.exists() {
        return Ok(Catalog::new());
    }
    let bytes = fs::read(&path).map_err(|err| ConnectionError::Io(err.to_string()))?;
    if bytes.len() > MAX_CATALOG_BYTES {
        return Err(ConnectionError::Io(format!("catalog too large: {} bytes", bytes.len())));
    }
    serde_yaml::from_slice(&bytes).map_err(|err| ConnectionError::Parse(err.to_string()))
}

// ============================================================================
// SECTION: Env Interpolation
// ============================================================================

/// Resolves every `${VAR}` placeholder in a config value.
///
/// This function reads the process environment and therefore must only be
/// reached from CLI command paths, never from the MCP server process.
///
/// # Errors
///
/// Returns [`ConnectionError::MissingEnv`] for the first unset variable.
#[allow(dead_code, reason = "public resolution API exercised via unit tests; no production caller yet")]
pub fn resolve_env(value: &Value) -> Result<Value, ConnectionError> {
    match value {
        Value::String(text) => Ok(Value::String(resolve_env_text(text)?)),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::new();
            for (key, entry) in map {
                resolved.insert(key.clone(), resolve_env(entry)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_env(item)?);
            }
            Ok(Value::Array(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolves placeholders inside one string.
#[allow(dead_code, reason = "used only by resolve_env, which has no production caller yet")]
fn resolve_env_text(text: &str) -> Result<String, ConnectionError> {
    if !text.contains("${") {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let (head, tail) = rest.split_at(start);
        out.push_str(head);
        let body = tail.get(2..).unwrap_or("");
        let Some(end) = body.find('}') else {
            out.push_str(tail);
            return Ok(out);
        };
        let name = body.get(..end).unwrap_or("");
        let value =
            env::var(name).map_err(|_| ConnectionError::MissingEnv(name.to_string()))?;
        out.push_str(&value);
        rest = body.get(end + 1..).unwrap_or("");
    }
    out.push_str(rest);
    Ok(out)
}

// ============================================================================
// SECTION: Listing & Doctor
// ============================================================================

/// One redacted catalog entry for `connections list`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    /// Connection family.
    pub family: String,
    /// Connection alias.
    pub alias: String,
    /// Redacted configuration.
    pub config: Value,
}

/// Lists the catalog with every value redacted.
#[must_use]
pub fn list_redacted(catalog: &Catalog) -> Vec<ConnectionSummary> {
    let mut out = Vec::new();
    for (family, aliases) in catalog {
        for (alias, config) in aliases {
            let mut redacted = config.clone();
            redaction::redact_denylist(&mut redacted);
            redaction::mask_placeholders(&mut redacted);
            out.push(ConnectionSummary {
                family: family.clone(),
                alias: alias.clone(),
                config: redacted,
            });
        }
    }
    out
}

/// One doctor probe result.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorEntry {
    /// Connection family.
    pub family: String,
    /// Connection alias.
    pub alias: String,
    /// True when every placeholder resolved.
    pub ok: bool,
    /// Names of unresolved environment variables (values never echoed).
    pub missing_env: Vec<String>,
}

/// Probes the catalog: every `${VAR}` must resolve.
#[must_use]
pub fn doctor(
    catalog: &Catalog,
    family_filter: Option<&str>,
    alias_filter: Option<&str>,
) -> Vec<DoctorEntry> {
    let mut out = Vec::new();
    for (family, aliases) in catalog {
        if family_filter.is_some_and(|filter| filter != family) {
            continue;
        }
        for (alias, config) in aliases {
            if alias_filter.is_some_and(|filter| filter != alias) {
                continue;
            }
            let mut missing = Vec::new();
            collect_missing_env(config, &mut missing);
            out.push(DoctorEntry {
                family: family.clone(),
                alias: alias.clone(),
                ok: missing.is_empty(),
                missing_env: missing,
            });
        }
    }
    out
}

/// Collects unresolved `${VAR}` names from a config value.
fn collect_missing_env(value: &Value, missing: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            let mut rest = text.as_str();
            while let Some(start) = rest.find("${") {
                let body = rest.get(start + 2..).unwrap_or("");
                let Some(end) = body.find('}') else {
                    return;
                };
                let name = body.get(..end).unwrap_or("");
                if env::var(name).is_err() && !missing.iter().any(|seen| seen == name) {
                    missing.push(name.to_string());
                }
                rest = body.get(end + 1..).unwrap_or("");
            }
        }
        Value::Object(map) => {
            for entry in map.values() {
                collect_missing_env(entry, missing);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_missing_env(item, missing);
            }
        }
        _ => {}
    }
}

/// Builds the JSON document printed by `connections list --json`.
#[must_use]
pub fn list_json(catalog: &Catalog) -> Value {
    json!({"connections": list_redacted(catalog)})
}

// ============================================================================
// SECTION: Tests
// ============================================================================
