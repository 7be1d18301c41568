// crates/osiris-registry/src/validate.rs
// ============================================================================
// Module: Component Spec Validation
// Description: Basic, enhanced, and strict validation of component specs.
// Purpose: Catch malformed specs before they reach the compiler or runner.
// Dependencies: jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Three validation levels build on each other. *Basic* validates the spec
//! document against the embedded meta-schema (JSON-Schema Draft 2020-12).
//! *Enhanced* additionally checks that `configSchema` is itself a valid
//! schema and that every shipped example validates against it. *Strict*
//! adds semantic checks: secret pointers must resolve under
//! `configSchema.properties` (or start with an allow-listed common prefix)
//! and every `llmHints.inputAliases` key must name a schema property.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use jsonschema::Draft;
use jsonschema::Validator;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Embedded meta-schema describing valid spec documents.
pub const SPEC_META_SCHEMA: &str = include_str!("../assets/spec.schema.json");

/// Secret pointer prefixes accepted without schema resolution.
pub const SECRET_POINTER_ALLOWLIST: &[&str] = &["/auth", "/credentials", "/connection"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Validation depth for component specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
    /// Meta-schema validation only.
    Basic,
    /// Basic plus configSchema self-checks and example validation.
    Enhanced,
    /// Enhanced plus semantic pointer and alias checks.
    Strict,
}

impl ValidationLevel {
    /// Parses a level label as used by the CLI (`--level`).
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "basic" => Some(Self::Basic),
            "enhanced" => Some(Self::Enhanced),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Enhanced => "enhanced",
            Self::Strict => "strict",
        }
    }
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationIssue {
    /// Level at which the issue was detected.
    pub level: &'static str,
    /// JSON Pointer into the spec document.
    pub pointer: String,
    /// Human-readable message.
    pub message: String,
}

impl ValidationIssue {
    /// Creates an issue record.
    fn new(level: ValidationLevel, pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.as_str(),
            pointer: pointer.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Meta-Schema Validator
// ============================================================================

/// Returns the process-wide meta-schema validator.
fn meta_validator() -> Result<&'static Validator, String> {
    static VALIDATOR: OnceLock<Result<Validator, String>> = OnceLock::new();
    VALIDATOR
        .get_or_init(|| {
            let schema: Value = serde_json::from_str(SPEC_META_SCHEMA)
                .map_err(|err| format!("embedded meta-schema is not json: {err}"))?;
            jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&schema)
                .map_err(|err| format!("embedded meta-schema rejected: {err}"))
        })
        .as_ref()
        .map_err(Clone::clone)
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a raw spec document at the requested level.
///
/// Returns an empty vector when the spec passes. Levels are cumulative:
/// strict runs the enhanced checks, enhanced runs the basic checks.
#[must_use]
pub fn validate_spec_value(spec: &Value, level: ValidationLevel) -> Vec<ValidationIssue> {
    let mut issues = validate_basic(spec);
    if level >= ValidationLevel::Enhanced && issues.is_empty() {
        issues.extend(validate_enhanced(spec));
    }
    if level >= ValidationLevel::Strict && issues.is_empty() {
        issues.extend(validate_strict(spec));
    }
    issues
}

/// Runs meta-schema validation.
fn validate_basic(spec: &Value) -> Vec<ValidationIssue> {
    let validator = match meta_validator() {
        Ok(validator) => validator,
        Err(message) => {
            return vec![ValidationIssue::new(ValidationLevel::Basic, "", message)];
        }
    };
    validator
        .iter_errors(spec)
        .map(|error| {
            ValidationIssue::new(
                ValidationLevel::Basic,
                error.instance_path().to_string(),
                error.to_string(),
            )
        })
        .collect()
}

/// Runs configSchema self-checks and example validation.
fn validate_enhanced(spec: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let Some(config_schema) = spec.get("configSchema") else {
        return issues;
    };
    if let Err(error) = jsonschema::meta::validate(config_schema) {
        issues.push(ValidationIssue::new(
            ValidationLevel::Enhanced,
            "/configSchema",
            format!("configSchema is not a valid json schema: {error}"),
        ));
        return issues;
    }
    let validator = match jsonschema::options().with_draft(Draft::Draft202012).build(config_schema)
    {
        Ok(validator) => validator,
        Err(error) => {
            issues.push(ValidationIssue::new(
                ValidationLevel::Enhanced,
                "/configSchema",
                format!("configSchema failed to compile: {error}"),
            ));
            return issues;
        }
    };
    if let Some(examples) = spec.get("examples").and_then(Value::as_array) {
        for (index, example) in examples.iter().enumerate() {
            let Some(config) = example.get("config") else {
                continue;
            };
            for error in validator.iter_errors(config) {
                issues.push(ValidationIssue::new(
                    ValidationLevel::Enhanced,
                    format!("/examples/{index}/config{}", error.instance_path()),
                    error.to_string(),
                ));
            }
        }
    }
    issues
}

/// Runs semantic pointer and alias checks.
fn validate_strict(spec: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let empty = Value::Null;
    let config_schema = spec.get("configSchema").unwrap_or(&empty);
    let mut check_pointer = |pointer: &str, source: String| {
        let allowlisted = SECRET_POINTER_ALLOWLIST
            .iter()
            .any(|prefix| pointer == *prefix || pointer.starts_with(&format!("{prefix}/")));
        if !allowlisted && !pointer_resolves_in_schema(config_schema, pointer) {
            issues.push(ValidationIssue::new(
                ValidationLevel::Strict,
                source,
                format!("secret pointer {pointer:?} does not resolve under configSchema.properties"),
            ));
        }
    };
    if let Some(secrets) = spec.get("secrets").and_then(Value::as_array) {
        for (index, pointer) in secrets.iter().enumerate() {
            if let Some(pointer) = pointer.as_str() {
                check_pointer(pointer, format!("/secrets/{index}"));
            }
        }
    }
    if let Some(extras) = spec.pointer("/redaction/extras").and_then(Value::as_array) {
        for (index, pointer) in extras.iter().enumerate() {
            if let Some(pointer) = pointer.as_str() {
                check_pointer(pointer, format!("/redaction/extras/{index}"));
            }
        }
    }
    if let Some(aliases) = spec.pointer("/llmHints/inputAliases").and_then(Value::as_object) {
        let properties = config_schema.get("properties").and_then(Value::as_object);
        for key in aliases.keys() {
            let known = properties.is_some_and(|props| props.contains_key(key));
            if !known {
                issues.push(ValidationIssue::new(
                    ValidationLevel::Strict,
                    format!("/llmHints/inputAliases/{key}"),
                    format!("alias target {key:?} is not a configSchema property"),
                ));
            }
        }
    }
    issues
}

/// Returns true when a JSON Pointer resolves through nested schema
/// `properties` maps.
fn pointer_resolves_in_schema(schema: &Value, pointer: &str) -> bool {
    let mut node = schema;
    for segment in pointer.split('/').skip(1) {
        let unescaped = segment.replace("~1", "/").replace("~0", "~");
        let Some(next) = node
            .get("properties")
            .and_then(|properties| properties.get(&unescaped))
        else {
            return false;
        };
        node = next;
    }
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
