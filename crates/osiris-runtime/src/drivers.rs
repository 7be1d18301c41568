// crates/osiris-runtime/src/drivers.rs
// ============================================================================
// Module: Driver Registry
// Description: Maps component names onto executable driver implementations.
// Purpose: Provide the builtin drivers and the registration seam.
// Dependencies: osiris-core, serde_json
// ============================================================================

//! ## Overview
//! Components declare behavior; drivers implement it. The registry maps a
//! component name to an [`osiris_core::Driver`]. Database drivers are
//! external collaborators registered by their host process; the builtins
//! shipped here are `inline.extractor` (literal rows from config) and
//! `csv.writer` (rows to a CSV artifact), which is enough to execute full
//! pipelines without any external service.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::sync::Arc;

use osiris_core::Driver;
use osiris_core::DriverError;
use osiris_core::DriverErrorKind;
use osiris_core::RunContext;
use osiris_core::StepId;
use osiris_core::StepOutput;
use serde_json::Value;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Name-to-driver mapping consulted by the execution adapters.
#[derive(Default, Clone)]
pub struct DriverRegistry {
    /// Registered drivers keyed by component name.
    drivers: BTreeMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the builtin drivers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("inline.extractor", Arc::new(InlineExtractor));
        registry.register("csv.writer", Arc::new(CsvWriter));
        registry
    }

    /// Registers (or replaces) a driver for a component name.
    pub fn register(&mut self, component: &str, driver: Arc<dyn Driver>) {
        self.drivers.insert(component.to_string(), driver);
    }

    /// Returns the driver for a component, when registered.
    #[must_use]
    pub fn get(&self, component: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(component).map(Arc::clone)
    }

    /// Lists registered component names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }
}

// ============================================================================
// SECTION: Inline Extractor
// ============================================================================

/// Driver yielding the literal rows declared in its config.
///
/// Config shape: `{rows: [{...}, ...]}`.
pub struct InlineExtractor;

impl Driver for InlineExtractor {
    fn run(
        &self,
        step_id: &StepId,
        config: &Value,
        _inputs: &BTreeMap<String, Value>,
        ctx: &mut dyn RunContext,
    ) -> Result<StepOutput, DriverError> {
        let rows = config
            .get("rows")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let count = rows.len() as u64;
        ctx.log_metric(step_id, "rows_read", Value::from(count), BTreeMap::new())
            .map_err(|err| DriverError::new(DriverErrorKind::Io, err.to_string()))?;
        let mut outputs = BTreeMap::new();
        outputs.insert("rows".to_string(), Value::Array(rows));
        Ok(StepOutput {
            rows: Some(count),
            outputs,
        })
    }
}

// ============================================================================
// SECTION: CSV Writer
// ============================================================================

/// Driver writing upstream rows into a CSV step artifact.
///
/// Config shape: `{path: "out/orders.csv", ...}`; only the file name of
/// `path` is used, and the artifact lands under the session's artifact
/// directory for the step.
pub struct CsvWriter;

impl Driver for CsvWriter {
    fn run(
        &self,
        step_id: &StepId,
        config: &Value,
        inputs: &BTreeMap<String, Value>,
        ctx: &mut dyn RunContext,
    ) -> Result<StepOutput, DriverError> {
        let configured = config.get("path").and_then(Value::as_str).unwrap_or("output.csv");
        let file_name = configured.rsplit('/').next().unwrap_or("output.csv");
        let rows = collect_rows(inputs);
        let target = ctx
            .artifact_path(step_id, file_name)
            .map_err(|err| DriverError::new(DriverErrorKind::Io, err.to_string()))?;
        let mut file = fs::File::create(&target)
            .map_err(|err| DriverError::new(DriverErrorKind::Io, err.to_string()))?;
        let columns = header_columns(&rows);
        write_csv(&mut file, &columns, &rows)
            .map_err(|err| DriverError::new(DriverErrorKind::Io, err.to_string()))?;
        let count = rows.len() as u64;
        ctx.log_metric(step_id, "rows_written", Value::from(count), BTreeMap::new())
            .map_err(|err| DriverError::new(DriverErrorKind::Io, err.to_string()))?;
        Ok(StepOutput {
            rows: Some(count),
            outputs: BTreeMap::new(),
        })
    }
}

/// Gathers row arrays from upstream step outputs.
fn collect_rows(inputs: &BTreeMap<String, Value>) -> Vec<Value> {
    let mut rows = Vec::new();
    for output in inputs.values() {
        if let Some(items) = output.get("rows").and_then(Value::as_array) {
            rows.extend(items.iter().cloned());
        }
    }
    rows
}

/// Returns the sorted union of object keys across rows.
fn header_columns(rows: &[Value]) -> Vec<String> {
    let mut columns = std::collections::BTreeSet::new();
    for row in rows {
        if let Some(map) = row.as_object() {
            for key in map.keys() {
                columns.insert(key.clone());
            }
        }
    }
    columns.into_iter().collect()
}

/// Writes the header and rows in CSV form.
fn write_csv(
    file: &mut fs::File,
    columns: &[String],
    rows: &[Value],
) -> std::io::Result<()> {
    writeln!(file, "{}", columns.join(","))?;
    for row in rows {
        let rendered: Vec<String> = columns
            .iter()
            .map(|column| match row.get(column) {
                Some(Value::String(text)) => escape_csv(text),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect();
        writeln!(file, "{}", rendered.join(","))?;
    }
    Ok(())
}

/// Quotes a CSV field when it contains separators or quotes.
fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
