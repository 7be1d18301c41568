// crates/osiris-compiler/src/validate.rs
// ============================================================================
// Module: OML Validator
// Description: Structural and semantic validation of OML declarations.
// Purpose: Reject malformed pipelines with stable OML### issue codes.
// Dependencies: jsonschema, osiris-core, osiris-registry
// ============================================================================

//! ## Overview
//! Structural checks cover required keys, step id charset and uniqueness,
//! and dependency references. Semantic checks build the step DAG (failing
//! on cycles with the cycle nodes reported), resolve components in the
//! registry, check declared modes, validate each step config against the
//! component's schema, and verify connection references are well-formed
//! symbolic handles. Every finding carries a stable `OML###` id and a JSON
//! Pointer into the document.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use jsonschema::Draft;
use osiris_core::ComponentName;
use osiris_core::ConnectionRef;
use osiris_core::PipelineSlug;
use osiris_core::StepId;
use osiris_registry::ComponentMode;
use osiris_registry::Registry;
use serde::Serialize;
use serde_json::Value;

use crate::oml::OmlDocument;
use crate::oml::SUPPORTED_OML_VERSIONS;

// ============================================================================
// SECTION: Issue Codes
// ============================================================================

/// Stable issue identifiers for OML validation findings.
pub mod codes {
    /// Missing or empty required key.
    pub const MISSING_REQUIRED: &str = "OML001";
    /// Step id violates the permitted charset.
    pub const BAD_STEP_ID: &str = "OML002";
    /// Duplicate step id.
    pub const DUPLICATE_STEP_ID: &str = "OML003";
    /// `depends_on` references an unknown step.
    pub const UNKNOWN_DEPENDENCY: &str = "OML004";
    /// Dependency cycle detected.
    pub const CYCLE: &str = "OML005";
    /// Component not found in the registry.
    pub const UNKNOWN_COMPONENT: &str = "OML006";
    /// Declared mode not supported by the component.
    pub const UNSUPPORTED_MODE: &str = "OML007";
    /// Step config fails the component schema.
    pub const CONFIG_INVALID: &str = "OML008";
    /// Malformed connection reference.
    pub const BAD_CONNECTION: &str = "OML009";
    /// Unsupported OML version.
    pub const BAD_VERSION: &str = "OML010";
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OmlIssue {
    /// Stable issue identifier (`OML###`).
    pub id: &'static str,
    /// JSON Pointer into the OML document.
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// Optional suggested fix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggest: Option<String>,
}

impl OmlIssue {
    /// Creates an issue without a suggestion.
    fn new(id: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            message: message.into(),
            suggest: None,
        }
    }

    /// Creates an issue carrying a suggestion.
    fn suggesting(
        id: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
        suggest: impl Into<String>,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            message: message.into(),
            suggest: Some(suggest.into()),
        }
    }
}

/// One fully validated pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedStep {
    /// Typed step identifier.
    pub id: StepId,
    /// Resolved component name.
    pub component: ComponentName,
    /// Resolved execution mode.
    pub mode: ComponentMode,
    /// Validated step configuration.
    pub config: Value,
    /// Typed upstream dependencies.
    pub depends_on: Vec<StepId>,
}

/// A validated pipeline with its topological step order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPipeline {
    /// Free-form pipeline name.
    pub name: String,
    /// Filesystem slug derived from the name.
    pub slug: PipelineSlug,
    /// Steps in declaration order.
    pub steps: Vec<ValidatedStep>,
    /// Indices into `steps` in topological order.
    pub topo_order: Vec<usize>,
}

// ============================================================================
// SECTION: Validation Entry Point
// ============================================================================

/// Validates an OML document against a component registry.
///
/// # Errors
///
/// Returns every detected [`OmlIssue`] when validation fails; the returned
/// vector is non-empty in that case.
pub fn validate_pipeline(
    doc: &OmlDocument,
    registry: &Registry,
) -> Result<ValidatedPipeline, Vec<OmlIssue>> {
    let mut issues = Vec::new();
    structural(doc, &mut issues);
    if !issues.is_empty() {
        return Err(issues);
    }
    semantic(doc, registry)
}

// ============================================================================
// SECTION: Structural Checks
// ============================================================================

/// Runs structural validation, appending findings to `issues`.
fn structural(doc: &OmlDocument, issues: &mut Vec<OmlIssue>) {
    if !SUPPORTED_OML_VERSIONS.contains(&doc.oml_version.as_str()) {
        issues.push(OmlIssue::suggesting(
            codes::BAD_VERSION,
            "/oml_version",
            format!("unsupported oml_version {:?}", doc.oml_version),
            format!("use one of: {}", SUPPORTED_OML_VERSIONS.join(", ")),
        ));
    }
    if doc.name.is_empty() {
        issues.push(OmlIssue::new(codes::MISSING_REQUIRED, "/name", "pipeline name is empty"));
    } else if PipelineSlug::derive(&doc.name).is_err() {
        issues.push(OmlIssue::new(
            codes::MISSING_REQUIRED,
            "/name",
            "pipeline name yields an empty slug",
        ));
    }
    if doc.steps.is_empty() {
        issues.push(OmlIssue::new(codes::MISSING_REQUIRED, "/steps", "steps must not be empty"));
    }
    let mut seen = BTreeSet::new();
    for (index, step) in doc.steps.iter().enumerate() {
        let path = format!("/steps/{index}/id");
        if StepId::parse(&step.id).is_err() {
            issues.push(OmlIssue::new(
                codes::BAD_STEP_ID,
                path.clone(),
                format!("step id {:?} must match [a-z0-9][a-z0-9_-]{{0,62}}", step.id),
            ));
        }
        if !seen.insert(step.id.clone()) {
            issues.push(OmlIssue::new(
                codes::DUPLICATE_STEP_ID,
                path,
                format!("duplicate step id {:?}", step.id),
            ));
        }
    }
    for (index, step) in doc.steps.iter().enumerate() {
        for (dep_index, dep) in step.depends_on.iter().enumerate() {
            if !doc.steps.iter().any(|candidate| &candidate.id == dep) {
                issues.push(OmlIssue::new(
                    codes::UNKNOWN_DEPENDENCY,
                    format!("/steps/{index}/depends_on/{dep_index}"),
                    format!("depends_on references unknown step {dep:?}"),
                ));
            }
        }
    }
}

// ============================================================================
// SECTION: Semantic Checks
// ============================================================================

/// Runs semantic validation and assembles the validated pipeline.
fn semantic(doc: &OmlDocument, registry: &Registry) -> Result<ValidatedPipeline, Vec<OmlIssue>> {
    let mut issues = Vec::new();
    let topo_order = match topological_order(doc) {
        Ok(order) => order,
        Err(cycle_nodes) => {
            issues.push(OmlIssue::new(
                codes::CYCLE,
                "/steps",
                format!("dependency cycle involving: {}", cycle_nodes.join(", ")),
            ));
            return Err(issues);
        }
    };
    let mut steps = Vec::with_capacity(doc.steps.len());
    for (index, step) in doc.steps.iter().enumerate() {
        let component = match ComponentName::parse(&step.component) {
            Ok(component) => component,
            Err(err) => {
                issues.push(OmlIssue::new(
                    codes::UNKNOWN_COMPONENT,
                    format!("/steps/{index}/component"),
                    err.to_string(),
                ));
                continue;
            }
        };
        let spec = match registry.get(component.as_str()) {
            Ok(spec) => spec,
            Err(_) => {
                issues.push(OmlIssue::new(
                    codes::UNKNOWN_COMPONENT,
                    format!("/steps/{index}/component"),
                    format!("component {:?} not found in registry", step.component),
                ));
                continue;
            }
        };
        let mode = match parse_mode(&step.mode) {
            Some(mode) if spec.supports_mode(mode) => mode,
            Some(mode) => {
                issues.push(OmlIssue::new(
                    codes::UNSUPPORTED_MODE,
                    format!("/steps/{index}/mode"),
                    format!("component {} does not support mode {}", component, mode.as_str()),
                ));
                continue;
            }
            None => {
                issues.push(OmlIssue::new(
                    codes::UNSUPPORTED_MODE,
                    format!("/steps/{index}/mode"),
                    format!("unknown mode {:?}", step.mode),
                ));
                continue;
            }
        };
        check_config_schema(&spec.config_schema, &step.config, index, &mut issues);
        check_connections(&step.config, index, &mut issues);
        let depends_on = step
            .depends_on
            .iter()
            .filter_map(|dep| StepId::parse(dep).ok())
            .collect();
        if let Ok(id) = StepId::parse(&step.id) {
            steps.push(ValidatedStep {
                id,
                component,
                mode,
                config: step.config.clone(),
                depends_on,
            });
        }
    }
    if !issues.is_empty() {
        return Err(issues);
    }
    let slug = PipelineSlug::derive(&doc.name).map_err(|err| {
        vec![OmlIssue::new(codes::MISSING_REQUIRED, "/name", err.to_string())]
    })?;
    Ok(ValidatedPipeline {
        name: doc.name.clone(),
        slug,
        steps,
        topo_order,
    })
}

/// Parses a declared mode label.
fn parse_mode(label: &str) -> Option<ComponentMode> {
    match label {
        "extract" => Some(ComponentMode::Extract),
        "write" => Some(ComponentMode::Write),
        "discover" => Some(ComponentMode::Discover),
        "transform" => Some(ComponentMode::Transform),
        _ => None,
    }
}

/// Validates one step config against the component schema.
fn check_config_schema(schema: &Value, config: &Value, index: usize, issues: &mut Vec<OmlIssue>) {
    let validator = match jsonschema::options().with_draft(Draft::Draft202012).build(schema) {
        Ok(validator) => validator,
        Err(error) => {
            issues.push(OmlIssue::new(
                codes::CONFIG_INVALID,
                format!("/steps/{index}/config"),
                format!("component schema failed to compile: {error}"),
            ));
            return;
        }
    };
    for error in validator.iter_errors(config) {
        issues.push(OmlIssue::new(
            codes::CONFIG_INVALID,
            format!("/steps/{index}/config{}", error.instance_path()),
            error.to_string(),
        ));
    }
}

/// Validates connection reference tokens inside a step config.
///
/// Every string held under a key named `connection` must be a well-formed
/// `@family.alias` handle; inline credentials are rejected by shape.
fn check_connections(config: &Value, index: usize, issues: &mut Vec<OmlIssue>) {
    let Some(map) = config.as_object() else {
        return;
    };
    for (key, value) in map {
        if key == "connection" {
            if let Some(text) = value.as_str() {
                if let Err(err) = ConnectionRef::parse(text) {
                    issues.push(OmlIssue::suggesting(
                        codes::BAD_CONNECTION,
                        format!("/steps/{index}/config/{key}"),
                        err.to_string(),
                        "use a symbolic handle like @mysql.default",
                    ));
                }
            }
        } else if value.is_object() {
            // Nested blocks may carry their own connection keys.
            check_connections(value, index, issues);
        }
    }
}

// ============================================================================
// SECTION: Topological Order
// ============================================================================

/// Computes a topological order over declared steps (Kahn's algorithm).
///
/// Ties resolve in declaration order so compilation stays deterministic.
///
/// # Errors
///
/// Returns the ids of steps left in the cycle when ordering is impossible.
fn topological_order(doc: &OmlDocument) -> Result<Vec<usize>, Vec<String>> {
    let index_of: BTreeMap<&str, usize> = doc
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| (step.id.as_str(), index))
        .collect();
    let mut in_degree = vec![0_usize; doc.steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); doc.steps.len()];
    for (index, step) in doc.steps.iter().enumerate() {
        for dep in &step.depends_on {
            if let Some(&dep_index) = index_of.get(dep.as_str()) {
                in_degree[index] += 1;
                dependents[dep_index].push(index);
            }
        }
    }
    let mut ready: Vec<usize> = in_degree
        .iter()
        .enumerate()
        .filter_map(|(index, &degree)| (degree == 0).then_some(index))
        .collect();
    let mut order = Vec::with_capacity(doc.steps.len());
    while let Some(index) = ready.first().copied() {
        ready.remove(0);
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(dependent);
                ready.sort_unstable();
            }
        }
    }
    if order.len() != doc.steps.len() {
        let cycle: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree > 0)
            .map(|(index, _)| doc.steps[index].id.clone())
            .collect();
        return Err(cycle);
    }
    Ok(order)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
