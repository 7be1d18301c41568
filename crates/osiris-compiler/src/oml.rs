// crates/osiris-compiler/src/oml.rs
// ============================================================================
// Module: OML Document Model
// Description: Typed representation of an OML pipeline declaration.
// Purpose: Parse OML YAML with size limits before validation.
// Dependencies: serde, serde_yaml
// ============================================================================

//! ## Overview
//! OML is the declarative pipeline description format: a YAML document with
//! an `oml_version`, a pipeline `name`, and an ordered list of steps naming
//! a component, a mode, a config block, and optional dependencies. Parsing
//! here is purely structural; all validation lives in
//! [`crate::validate`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted OML document size in bytes.
pub const MAX_OML_BYTES: usize = 1024 * 1024;

/// OML versions this compiler understands.
pub const SUPPORTED_OML_VERSIONS: &[&str] = &["0.1.0"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while parsing OML bytes.
#[derive(Debug, Error)]
pub enum OmlParseError {
    /// Document exceeds the size limit.
    #[error("oml document too large: {size} bytes (max {MAX_OML_BYTES})")]
    TooLarge {
        /// Observed document size.
        size: usize,
    },
    /// YAML parsing failed.
    #[error("oml parse failed: {0}")]
    Yaml(String),
}

// ============================================================================
// SECTION: Document Types
// ============================================================================

/// One declared pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmlStep {
    /// Step identifier, unique within the pipeline.
    pub id: String,
    /// Component reference (`family.kind`).
    pub component: String,
    /// Declared execution mode.
    pub mode: String,
    /// Component configuration block.
    #[serde(default)]
    pub config: Value,
    /// Upstream step dependencies.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A parsed OML pipeline declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmlDocument {
    /// OML format version.
    pub oml_version: String,
    /// Free-form pipeline name; slugified for path use.
    pub name: String,
    /// Ordered pipeline steps.
    #[serde(default)]
    pub steps: Vec<OmlStep>,
}

impl OmlDocument {
    /// Parses an OML document from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`OmlParseError`] when the document is oversized or is not
    /// well-formed YAML matching the OML structure.
    pub fn parse(bytes: &[u8]) -> Result<Self, OmlParseError> {
        if bytes.len() > MAX_OML_BYTES {
            return Err(OmlParseError::TooLarge {
                size: bytes.len(),
            });
        }
        serde_yaml::from_slice(bytes).map_err(|err| OmlParseError::Yaml(err.to_string()))
    }

    /// Parses the raw document value used for fingerprinting.
    ///
    /// # Errors
    ///
    /// Returns [`OmlParseError`] when the bytes are not well-formed YAML.
    pub fn parse_raw(bytes: &[u8]) -> Result<Value, OmlParseError> {
        if bytes.len() > MAX_OML_BYTES {
            return Err(OmlParseError::TooLarge {
                size: bytes.len(),
            });
        }
        serde_yaml::from_slice(bytes).map_err(|err| OmlParseError::Yaml(err.to_string()))
    }
}
