// crates/osiris-registry/src/spec.rs
// ============================================================================
// Module: Component Spec Model
// Description: Declarative record describing one reusable component.
// Purpose: Parse spec.yaml documents into typed, serializable records.
// Dependencies: osiris-core, serde
// ============================================================================

//! ## Overview
//! A component spec declares a component's name, version, supported modes,
//! its configuration JSON-Schema, the JSON Pointers naming secret config
//! fields, optional examples, and optional LLM input-alias hints. Wire keys
//! use the catalog's camelCase convention (`configSchema`, `llmHints`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use osiris_core::ComponentName;
use osiris_core::SecretMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Component Mode
// ============================================================================

/// Execution modes a component may support.
///
/// # Invariants
/// - Wire labels are stable for OML validation and `components list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentMode {
    /// Reads rows from a source.
    Extract,
    /// Writes rows to a destination.
    Write,
    /// Discovers schema or table metadata.
    Discover,
    /// Transforms rows in flight.
    Transform,
}

impl ComponentMode {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Write => "write",
            Self::Discover => "discover",
            Self::Transform => "transform",
        }
    }
}

// ============================================================================
// SECTION: Spec Records
// ============================================================================

/// Worked configuration example shipped with a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentExample {
    /// Short example title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Example config document; must validate against the spec's schema.
    pub config: Value,
}

/// Hints for LLM clients mapping loose field names onto schema properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmHints {
    /// Alias lists keyed by canonical `configSchema` property name.
    #[serde(default, rename = "inputAliases")]
    pub input_aliases: BTreeMap<String, Vec<String>>,
}

/// Redaction extras declared alongside the secret pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionSpec {
    /// Additional pointers masked for defense in depth.
    #[serde(default)]
    pub extras: Vec<String>,
}

/// One component's declarative specification.
///
/// # Invariants
/// - `name` is unique within a registry.
/// - Every example config validates against `config_schema`.
/// - Every secret pointer resolves under `config_schema` (strict level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Unique component name (`family.kind`).
    pub name: ComponentName,
    /// Spec version string.
    pub version: String,
    /// Supported execution modes.
    pub modes: Vec<ComponentMode>,
    /// JSON-Schema describing the component's configuration.
    #[serde(rename = "configSchema")]
    pub config_schema: Value,
    /// JSON Pointers naming secret config fields.
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Redaction extras.
    #[serde(default)]
    pub redaction: RedactionSpec,
    /// Worked configuration examples.
    #[serde(default)]
    pub examples: Vec<ComponentExample>,
    /// Optional LLM input-alias hints.
    #[serde(default, rename = "llmHints", skip_serializing_if = "Option::is_none")]
    pub llm_hints: Option<LlmHints>,
}

impl ComponentSpec {
    /// Returns true when the spec supports the given mode.
    #[must_use]
    pub fn supports_mode(&self, mode: ComponentMode) -> bool {
        self.modes.contains(&mode)
    }

    /// Returns the secret pointer map the redaction layer consumes.
    #[must_use]
    pub fn secret_map(&self) -> SecretMap {
        SecretMap {
            secrets: self.secrets.clone(),
            redaction_extras: self.redaction.extras.clone(),
        }
    }
}
