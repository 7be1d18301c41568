// crates/osiris-mcp/src/resources.rs
// ============================================================================
// Module: MCP Resources
// Description: Read-only osiris:// resource URIs for LLM clients.
// Purpose: Map URI segments onto embedded assets and contract files.
// Dependencies: osiris-config, serde_json
// ============================================================================

//! ## Overview
//! Resources live under `osiris://mcp/…`: JSON schemas, the authoring
//! guide, the usecase catalog, and session memory files. Resolution is
//! pure path mapping: URI segments are validated against a strict
//! character whitelist and joined under contract-resolved directories, so
//! user-supplied input can never escape into arbitrary filesystem paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use osiris_config::FilesystemContract;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::tools::GUIDE_TEXT;
use crate::tools::OML_SCHEMA;
use crate::tools::USECASES;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// URI prefix for every MCP resource.
pub const RESOURCE_PREFIX: &str = "osiris://mcp/";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by resource resolution.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// URI does not start with the resource prefix or names no resource.
    #[error("unknown resource uri: {0}")]
    Unknown(String),
    /// A URI segment contains characters outside the whitelist.
    #[error("invalid resource segment: {0:?}")]
    BadSegment(String),
    /// Backing file could not be read.
    #[error("resource read failed: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// One resource listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceEntry {
    /// Resource URI.
    pub uri: String,
    /// MIME type.
    pub mime_type: &'static str,
    /// Short description.
    pub description: &'static str,
}

// ============================================================================
// SECTION: Listing & Reading
// ============================================================================

/// Lists the fixed resource catalog plus discovered memory files.
#[must_use]
pub fn list_resources(contract: &FilesystemContract) -> Vec<ResourceEntry> {
    let mut entries = vec![
        ResourceEntry {
            uri: format!("{RESOURCE_PREFIX}schemas/oml"),
            mime_type: "application/schema+json",
            description: "OML pipeline declaration schema",
        },
        ResourceEntry {
            uri: format!("{RESOURCE_PREFIX}schemas/component-spec"),
            mime_type: "application/schema+json",
            description: "Component spec meta-schema",
        },
        ResourceEntry {
            uri: format!("{RESOURCE_PREFIX}prompts/guide"),
            mime_type: "text/markdown",
            description: "Pipeline authoring guide",
        },
        ResourceEntry {
            uri: format!("{RESOURCE_PREFIX}usecases"),
            mime_type: "application/json",
            description: "Usecase catalog",
        },
    ];
    let memory_dir = contract
        .base_path()
        .join(&contract.config().filesystem.sessions_dir)
        .join("memory");
    if let Ok(files) = fs::read_dir(&memory_dir) {
        let mut names: Vec<String> = files
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| name.ends_with(".json"))
            .collect();
        names.sort();
        for name in names {
            let stem = name.trim_end_matches(".json").to_string();
            entries.push(ResourceEntry {
                uri: format!("{RESOURCE_PREFIX}memory/{stem}"),
                mime_type: "application/json",
                description: "Session memory notes",
            });
        }
    }
    entries
}

/// Reads one resource by URI.
///
/// # Errors
///
/// Returns [`ResourceError`] for unknown URIs, invalid segments, and read
/// failures.
pub fn read_resource(contract: &FilesystemContract, uri: &str) -> Result<Value, ResourceError> {
    let Some(path) = uri.strip_prefix(RESOURCE_PREFIX) else {
        return Err(ResourceError::Unknown(uri.to_string()));
    };
    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments {
        validate_segment(segment)?;
    }
    let text = match segments.as_slice() {
        ["schemas", "oml"] => OML_SCHEMA.to_string(),
        ["schemas", "component-spec"] => {
            osiris_registry::validate::SPEC_META_SCHEMA.to_string()
        }
        ["prompts", "guide"] => GUIDE_TEXT.to_string(),
        ["usecases"] => USECASES.to_string(),
        ["memory", name] => {
            let file = contract
                .base_path()
                .join(&contract.config().filesystem.sessions_dir)
                .join("memory")
                .join(format!("{name}.json"));
            fs::read_to_string(&file).map_err(|err| ResourceError::Io(err.to_string()))?
        }
        _ => return Err(ResourceError::Unknown(uri.to_string())),
    };
    Ok(json!({
        "uri": uri,
        "text": text,
    }))
}

/// Validates one URI segment against the strict whitelist.
fn validate_segment(segment: &str) -> Result<(), ResourceError> {
    let valid = !segment.is_empty()
        && segment.len() <= 64
        && segment
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(ResourceError::BadSegment(segment.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
