// crates/osiris-compiler/src/manifest.rs
// ============================================================================
// Module: Compiled Manifest Model
// Description: Canonical manifest, execution plan, and summary types.
// Purpose: Serialize deterministic build artifacts and reload them for runs.
// Dependencies: osiris-core, serde, serde_yaml
// ============================================================================

//! ## Overview
//! The manifest is the content-addressed derivation of an OML document. Its
//! hash is computed over canonical JSON with the `meta.generated_at` field
//! and the self-referential `manifest_fp` masked, so the hash is
//! time-independent and reproducible from the file. The execution plan is
//! the runner-facing projection of the manifest; the run summary records
//! compile metadata for humans.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use osiris_core::ManifestHash;
use osiris_core::hashing::HashError;
use osiris_core::hashing::hash_canonical_json;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or hashing manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file could not be read.
    #[error("manifest read failed for {path}: {message}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying message.
        message: String,
    },
    /// YAML parsing failed.
    #[error("manifest parse failed: {0}")]
    Parse(String),
    /// Canonical hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Stored hash does not match recomputed hash.
    #[error("manifest hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        /// Hash recorded in the manifest fingerprints.
        stored: String,
        /// Hash recomputed from the manifest contents.
        computed: String,
    },
}

// ============================================================================
// SECTION: Manifest Types
// ============================================================================

/// Toolchain versions recorded at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    /// Compiler crate version.
    pub compiler: String,
    /// OML format version the document declared.
    pub oml_version: String,
}

/// Manifest metadata block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMeta {
    /// RFC3339 generation timestamp (masked during hashing).
    pub generated_at: String,
    /// OML format version.
    pub oml_version: String,
    /// Profile the manifest was compiled under.
    pub profile: String,
    /// Run-id placeholder substituted at run time.
    pub run_id: String,
    /// Toolchain versions.
    pub toolchain: ToolchainInfo,
}

/// Content fingerprints of the compilation inputs and output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprints {
    /// Hash of the canonical OML document.
    pub oml_fp: String,
    /// Hash of the canonical params map.
    pub params_fp: String,
    /// Hash of the registry subset used.
    pub registry_fp: String,
    /// Hash of the compiler version and flags.
    pub compiler_fp: String,
    /// Hash of the manifest itself (masked during hashing).
    pub manifest_fp: String,
}

/// One compiled manifest step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestStep {
    /// Step identifier.
    pub id: String,
    /// Driver (component) name resolved for the step.
    pub driver: String,
    /// Declared execution mode.
    pub mode: String,
    /// Config file reference relative to the build directory.
    pub cfg_path: String,
    /// Upstream step ids.
    pub needs: Vec<String>,
}

/// Pipeline block of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPipeline {
    /// Free-form pipeline name.
    pub name: String,
    /// Filesystem slug.
    pub slug: String,
    /// Input/output fingerprints.
    pub fingerprints: Fingerprints,
    /// Steps in topological order.
    pub steps: Vec<ManifestStep>,
}

/// Manifest trailer metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Absolute path of the manifest file as written.
    pub source_manifest_path: String,
}

/// Canonical, content-addressed compilation output of an OML document.
///
/// # Invariants
/// - Identical inputs produce byte-identical YAML modulo
///   `meta.generated_at`.
/// - `pipeline.fingerprints.manifest_fp` equals [`Manifest::compute_hash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metadata block.
    pub meta: ManifestMeta,
    /// Pipeline block.
    pub pipeline: ManifestPipeline,
    /// Trailer metadata.
    pub metadata: ManifestMetadata,
}

impl Manifest {
    /// Computes the manifest hash with time and self-reference masked.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Hash`] when canonicalization fails.
    pub fn compute_hash(&self) -> Result<String, ManifestError> {
        let mut masked = self.clone();
        masked.meta.generated_at = String::new();
        masked.pipeline.fingerprints.manifest_fp = String::new();
        masked.metadata.source_manifest_path = String::new();
        Ok(hash_canonical_json(&masked)?.hex)
    }

    /// Loads a manifest from a YAML file, verifying its stored hash.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when reading, parsing, or hash
    /// verification fails.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = fs::read(path).map_err(|err| ManifestError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let manifest: Self =
            serde_yaml::from_slice(&bytes).map_err(|err| ManifestError::Parse(err.to_string()))?;
        let computed = manifest.compute_hash()?;
        if manifest.pipeline.fingerprints.manifest_fp != computed {
            return Err(ManifestError::HashMismatch {
                stored: manifest.pipeline.fingerprints.manifest_fp.clone(),
                computed,
            });
        }
        Ok(manifest)
    }

    /// Returns the manifest hash as a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] when the stored hash is malformed.
    pub fn hash(&self) -> Result<ManifestHash, ManifestError> {
        ManifestHash::parse(&self.pipeline.fingerprints.manifest_fp)
            .map_err(|err| ManifestError::Parse(err.to_string()))
    }
}

// ============================================================================
// SECTION: Execution Plan
// ============================================================================

/// One step of the runner-facing execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step identifier.
    pub id: String,
    /// Driver (component) name.
    pub driver: String,
    /// Config file reference relative to the build directory.
    pub cfg_path: String,
    /// Upstream step ids.
    pub needs: Vec<String>,
}

/// Execution plan projected from a manifest (`plan.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Pipeline slug.
    pub pipeline: String,
    /// Profile label.
    pub profile: String,
    /// Manifest hash this plan was projected from.
    pub manifest_hash: String,
    /// Steps in topological order.
    pub steps: Vec<PlanStep>,
}

// ============================================================================
// SECTION: Run Summary
// ============================================================================

/// Compile metadata written next to the manifest (`run_summary.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// RFC3339 compile timestamp.
    pub compiled_at: String,
    /// Profile label.
    pub profile: String,
    /// Pipeline slug.
    pub pipeline: String,
    /// Manifest hash.
    pub manifest_hash: String,
    /// Manifest short prefix.
    pub manifest_short: String,
    /// Number of compiled steps.
    pub step_count: usize,
}
