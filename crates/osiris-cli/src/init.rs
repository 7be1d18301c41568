// crates/osiris-cli/src/init.rs
// ============================================================================
// Module: Project Init
// Description: Scaffolds osiris.yaml, the .osiris subtree, and components.
// Purpose: Create a working project idempotently, never clobbering files.
// Dependencies: osiris-config, serde_yaml
// ============================================================================

//! ## Overview
//! `osiris init` writes a complete `osiris.yaml` with an absolute base
//! path, creates the `.osiris/` index subtree, seeds starter component
//! specs, and merges ignore entries into `.gitignore`. On a populated
//! directory nothing is overwritten unless `--force` is passed; running
//! twice on a pristine directory is a no-op.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use osiris_config::FilesystemConfig;
use osiris_config::OsirisConfig;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Ignore entries merged into `.gitignore`.
const GITIGNORE_ENTRIES: &[&str] = &["/build/", "/run_logs/", "/aiop/", "/.osiris/", "/output/"];

/// Starter extractor spec for MySQL sources.
const MYSQL_EXTRACTOR_SPEC: &str = "name: mysql.extractor
version: 1.0.0
modes: [extract, discover]
configSchema:
  type: object
  required: [connection, table]
  properties:
    connection: {type: string}
    table: {type: string}
    query: {type: string}
    password: {type: string}
secrets: [/password]
redaction:
  extras: [/connection]
examples:
  - title: full table extract
    config: {connection: \"@mysql.default\", table: orders}
llmHints:
  inputAliases:
    table: [table_name, source_table]
";

/// Starter writer spec for CSV outputs.
const CSV_WRITER_SPEC: &str = "name: csv.writer
version: 1.0.0
modes: [write]
configSchema:
  type: object
  required: [connection, path]
  properties:
    connection: {type: string}
    path: {type: string}
    delimiter: {type: string}
examples:
  - title: write orders
    config: {connection: \"@fs.local\", path: out/orders.csv}
";

/// Starter extractor spec yielding inline literal rows.
const INLINE_EXTRACTOR_SPEC: &str = "name: inline.extractor
version: 1.0.0
modes: [extract]
configSchema:
  type: object
  required: [rows]
  properties:
    rows: {type: array}
examples:
  - title: two literal rows
    config: {rows: [{id: 1}, {id: 2}]}
";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by init.
#[derive(Debug, Error)]
pub enum InitError {
    /// A file exists and `--force` was not passed.
    #[error("{0} already exists (use --force to overwrite)")]
    Exists(String),
    /// Filesystem write failed.
    #[error("init write failed: {0}")]
    Io(String),
    /// Config rendering failed.
    #[error("config rendering failed: {0}")]
    Render(String),
}

// ============================================================================
// SECTION: Init
// ============================================================================

/// Initializes an Osiris project rooted at `base`.
///
/// # Errors
///
/// Returns [`InitError`] when `osiris.yaml` exists without `--force` or
/// any write fails.
pub fn run(base: &Path, force: bool) -> Result<(), InitError> {
    let config_path = base.join("osiris.yaml");
    if config_path.exists() && !force {
        return Err(InitError::Exists("osiris.yaml".to_string()));
    }
    let config = OsirisConfig {
        filesystem: FilesystemConfig {
            base_path: base.display().to_string(),
            ..FilesystemConfig::default()
        },
        ..OsirisConfig::default()
    };
    let rendered =
        serde_yaml::to_string(&config).map_err(|err| InitError::Render(err.to_string()))?;
    fs::write(&config_path, rendered).map_err(|err| InitError::Io(err.to_string()))?;

    for dir in [
        ".osiris/index/by_pipeline",
        ".osiris/index/latest",
        ".osiris/sessions/memory",
        ".osiris/cache",
        ".osiris/mcp_logs",
        "pipelines",
        "components",
    ] {
        fs::create_dir_all(base.join(dir)).map_err(|err| InitError::Io(err.to_string()))?;
    }
    seed_component(base, "mysql.extractor", MYSQL_EXTRACTOR_SPEC, force)?;
    seed_component(base, "csv.writer", CSV_WRITER_SPEC, force)?;
    seed_component(base, "inline.extractor", INLINE_EXTRACTOR_SPEC, force)?;
    merge_gitignore(base)?;
    Ok(())
}

/// Writes one starter component spec unless it already exists.
fn seed_component(base: &Path, name: &str, spec: &str, force: bool) -> Result<(), InitError> {
    let dir = base.join("components").join(name);
    fs::create_dir_all(&dir).map_err(|err| InitError::Io(err.to_string()))?;
    let path = dir.join("spec.yaml");
    if path.exists() && !force {
        return Ok(());
    }
    fs::write(&path, spec).map_err(|err| InitError::Io(err.to_string()))
}

/// Merges the ignore entries into `.gitignore`, preserving existing lines.
fn merge_gitignore(base: &Path) -> Result<(), InitError> {
    let path = base.join(".gitignore");
    let existing = fs::read_to_string(&path).unwrap_or_default();
    let mut merged = existing.clone();
    for entry in GITIGNORE_ENTRIES {
        if !existing.lines().any(|line| line.trim() == *entry) {
            if !merged.is_empty() && !merged.ends_with('\n') {
                merged.push('\n');
            }
            merged.push_str(entry);
            merged.push('\n');
        }
    }
    if merged != existing {
        fs::write(&path, merged).map_err(|err| InitError::Io(err.to_string()))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
