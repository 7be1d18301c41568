// crates/osiris-registry/src/registry.rs
// ============================================================================
// Module: Component Registry
// Description: Discovery, caching, and lookup of component specs.
// Purpose: Serve validated specs with mtime-based cache invalidation.
// Dependencies: osiris-core, serde_yaml, serde_json
// ============================================================================

//! ## Overview
//! The registry walks `<root>/<component_name>/spec.yaml`, parses and
//! validates each spec, and caches the result keyed by component name with
//! the file's mtime. Reads stat the file and reload when the mtime changed.
//! Invalid specs are remembered with their issues: `list` filters them,
//! `get` reports [`RegistryError::SpecNotFound`], and `validate` surfaces
//! the recorded issues. The cache is process-local behind a mutex; readers
//! receive cloned [`std::sync::Arc`] snapshots.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;

use osiris_core::SecretMap;
use serde_json::Value;
use thiserror::Error;

use crate::spec::ComponentMode;
use crate::spec::ComponentSpec;
use crate::validate::ValidationIssue;
use crate::validate::ValidationLevel;
use crate::validate::validate_spec_value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Spec filename inside each component directory.
pub const SPEC_FILE_NAME: &str = "spec.yaml";
/// Maximum accepted spec file size in bytes.
pub const MAX_SPEC_FILE_SIZE: usize = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by registry operations.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No valid spec exists under the requested name.
    #[error("component spec not found: {0}")]
    SpecNotFound(String),
    /// Two directories declare the same component name.
    #[error("duplicate component name: {0}")]
    DuplicateComponent(String),
    /// A spec failed validation.
    #[error("invalid spec {name} ({level}): {count} issue(s)")]
    InvalidSpec {
        /// Component name (or directory name when the spec is unreadable).
        name: String,
        /// Validation level that failed.
        level: &'static str,
        /// Number of recorded issues.
        count: usize,
    },
    /// Registry root or spec file I/O failed.
    #[error("registry i/o failed for {path}: {message}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },
    /// Internal lock poisoned.
    #[error("registry cache lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Cache Entries
// ============================================================================

/// Cached outcome for one spec file.
#[derive(Debug, Clone)]
enum CachedOutcome {
    /// Spec parsed and validated at the cached level.
    Valid(Arc<ComponentSpec>),
    /// Spec failed parsing or validation; issues recorded for reporting.
    #[allow(dead_code, reason = "issues are retained for Debug/Clone parity; callers re-derive them via validate_spec_value")]
    Invalid(Vec<ValidationIssue>),
}

/// One cache entry with its source mtime.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Spec file path.
    path: PathBuf,
    /// File mtime at load.
    mtime: SystemTime,
    /// Raw document as parsed from YAML.
    raw: Value,
    /// Load outcome.
    outcome: CachedOutcome,
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Immutable subset of the registry taken for one compile.
///
/// The snapshot participates in the compiler's registry fingerprint, so it
/// holds the raw spec documents in a deterministic map.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct RegistrySnapshot {
    /// Raw spec documents keyed by component name.
    pub specs: BTreeMap<String, Value>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Process-local component spec catalog.
pub struct Registry {
    /// Components root directory.
    root: PathBuf,
    /// Cache keyed by component name.
    cache: Mutex<BTreeMap<String, CacheEntry>>,
}

impl Registry {
    /// Loads a registry by walking `<root>/<component_name>/spec.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the root cannot be read or two
    /// directories declare the same component name. Individual invalid
    /// specs do not fail the load; they are cached with their issues.
    pub fn load(root: &Path) -> Result<Self, RegistryError> {
        let registry = Self {
            root: root.to_path_buf(),
            cache: Mutex::new(BTreeMap::new()),
        };
        let entries = fs::read_dir(root).map_err(|err| RegistryError::Io {
            path: root.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut cache = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|err| RegistryError::Io {
                path: root.to_path_buf(),
                message: err.to_string(),
            })?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let spec_path = dir.join(SPEC_FILE_NAME);
            if !spec_path.is_file() {
                continue;
            }
            let loaded = load_entry(&spec_path)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let CachedOutcome::Valid(spec) = &loaded.outcome {
                if spec.name.as_str() != name {
                    // Directory/name mismatch is a validation defect, not a
                    // lookup alias.
                    let issues = vec![ValidationIssue {
                        level: "strict",
                        pointer: "/name".to_string(),
                        message: format!(
                            "spec name {} does not match directory {name}",
                            spec.name
                        ),
                    }];
                    cache.insert(name, CacheEntry {
                        outcome: CachedOutcome::Invalid(issues),
                        ..loaded
                    });
                    continue;
                }
            }
            if cache.insert(name.clone(), loaded).is_some() {
                return Err(RegistryError::DuplicateComponent(name));
            }
        }
        if let Ok(mut guard) = registry.cache.lock() {
            *guard = cache;
        }
        Ok(registry)
    }

    /// Returns the components root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the spec registered under `name`, reloading on mtime change.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::SpecNotFound`] when no valid spec exists.
    pub fn get(&self, name: &str) -> Result<Arc<ComponentSpec>, RegistryError> {
        let entry = self.refreshed_entry(name)?;
        match entry.outcome {
            CachedOutcome::Valid(spec) => Ok(spec),
            CachedOutcome::Invalid(_) => Err(RegistryError::SpecNotFound(name.to_string())),
        }
    }

    /// Lists valid specs, optionally filtered to those supporting a mode.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when the cache lock is poisoned.
    pub fn list(&self, mode: Option<ComponentMode>) -> Result<Vec<Arc<ComponentSpec>>, RegistryError> {
        let guard = self.cache.lock().map_err(|_| RegistryError::Poisoned)?;
        let mut specs: Vec<Arc<ComponentSpec>> = guard
            .values()
            .filter_map(|entry| match &entry.outcome {
                CachedOutcome::Valid(spec) => Some(Arc::clone(spec)),
                CachedOutcome::Invalid(_) => None,
            })
            .filter(|spec| mode.is_none_or(|mode| spec.supports_mode(mode)))
            .collect();
        specs.sort_by(|left, right| left.name.as_str().cmp(right.name.as_str()));
        Ok(specs)
    }

    /// Returns the secret pointer map for a component.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::SpecNotFound`] when no valid spec exists.
    pub fn secret_map(&self, name: &str) -> Result<SecretMap, RegistryError> {
        Ok(self.get(name)?.secret_map())
    }

    /// Validates a component's raw spec document at the requested level.
    ///
    /// Unlike [`Registry::get`], this reports issues for invalid specs
    /// instead of hiding them.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::SpecNotFound`] when no spec file exists at
    /// all under the name.
    pub fn validate(
        &self,
        name: &str,
        level: ValidationLevel,
    ) -> Result<Vec<ValidationIssue>, RegistryError> {
        let entry = self.refreshed_entry(name)?;
        Ok(validate_spec_value(&entry.raw, level))
    }

    /// Takes an immutable snapshot of the named components for compilation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::SpecNotFound`] when any requested component
    /// is missing or invalid.
    pub fn snapshot(&self, names: &[&str]) -> Result<RegistrySnapshot, RegistryError> {
        let mut specs = BTreeMap::new();
        for name in names {
            let entry = self.refreshed_entry(name)?;
            match entry.outcome {
                CachedOutcome::Valid(_) => {
                    specs.insert((*name).to_string(), entry.raw);
                }
                CachedOutcome::Invalid(_) => {
                    return Err(RegistryError::SpecNotFound((*name).to_string()));
                }
            }
        }
        Ok(RegistrySnapshot {
            specs,
        })
    }

    /// Returns the cache entry for `name`, reloading when the file mtime
    /// changed since the last read.
    fn refreshed_entry(&self, name: &str) -> Result<CacheEntry, RegistryError> {
        let mut guard = self.cache.lock().map_err(|_| RegistryError::Poisoned)?;
        let Some(existing) = guard.get(name) else {
            return Err(RegistryError::SpecNotFound(name.to_string()));
        };
        let path = existing.path.clone();
        let mtime = file_mtime(&path)?;
        if mtime != existing.mtime {
            let reloaded = load_entry(&path)?;
            guard.insert(name.to_string(), reloaded.clone());
            return Ok(reloaded);
        }
        Ok(existing.clone())
    }
}

// ============================================================================
// SECTION: Loading Helpers
// ============================================================================

/// Reads a file's mtime.
fn file_mtime(path: &Path) -> Result<SystemTime, RegistryError> {
    let metadata = fs::metadata(path).map_err(|err| RegistryError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    metadata.modified().map_err(|err| RegistryError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Loads and validates one spec file into a cache entry.
fn load_entry(path: &Path) -> Result<CacheEntry, RegistryError> {
    let mtime = file_mtime(path)?;
    let bytes = fs::read(path).map_err(|err| RegistryError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    if bytes.len() > MAX_SPEC_FILE_SIZE {
        return Ok(CacheEntry {
            path: path.to_path_buf(),
            mtime,
            raw: Value::Null,
            outcome: CachedOutcome::Invalid(vec![ValidationIssue {
                level: "basic",
                pointer: String::new(),
                message: format!("spec file too large: {} bytes", bytes.len()),
            }]),
        });
    }
    let raw: Value = match serde_yaml::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(err) => {
            return Ok(CacheEntry {
                path: path.to_path_buf(),
                mtime,
                raw: Value::Null,
                outcome: CachedOutcome::Invalid(vec![ValidationIssue {
                    level: "basic",
                    pointer: String::new(),
                    message: format!("spec parse failed: {err}"),
                }]),
            });
        }
    };
    let issues = validate_spec_value(&raw, ValidationLevel::Enhanced);
    if !issues.is_empty() {
        return Ok(CacheEntry {
            path: path.to_path_buf(),
            mtime,
            raw,
            outcome: CachedOutcome::Invalid(issues),
        });
    }
    match serde_json::from_value::<ComponentSpec>(raw.clone()) {
        Ok(spec) => Ok(CacheEntry {
            path: path.to_path_buf(),
            mtime,
            raw,
            outcome: CachedOutcome::Valid(Arc::new(spec)),
        }),
        Err(err) => Ok(CacheEntry {
            path: path.to_path_buf(),
            mtime,
            raw,
            outcome: CachedOutcome::Invalid(vec![ValidationIssue {
                level: "basic",
                pointer: String::new(),
                message: format!("spec deserialization failed: {err}"),
            }]),
        }),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
