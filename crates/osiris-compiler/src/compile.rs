// crates/osiris-compiler/src/compile.rs
// ============================================================================
// Module: Osiris Compiler
// Description: OML to content-addressed build artifact compilation.
// Purpose: Produce deterministic manifests and update latest pointers.
// Dependencies: osiris-config, osiris-core, osiris-registry
// ============================================================================

//! ## Overview
//! Compilation parses and validates the OML document, substitutes
//! `${params.*}` references, computes input fingerprints, assembles the
//! canonical manifest, and writes the build artifact directory atomically:
//! files are staged into a hidden sibling directory and the stage is renamed
//! into place, so a failed compile leaves no partial build directory and the
//! latest pointers are only replaced after the rename succeeds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use osiris_config::ConfigError;
use osiris_config::FilesystemContract;
use osiris_config::ManifestPaths;
use osiris_config::PointerFile;
use osiris_config::contract::ensure_dir;
use osiris_core::ManifestHash;
use osiris_core::ManifestShort;
use osiris_core::Profile;
use osiris_core::hashing::HashError;
use osiris_core::hashing::hash_canonical_json;
use osiris_core::time::format_rfc3339_millis;
use osiris_core::time::utc_now_ms;
use osiris_registry::Registry;
use osiris_registry::RegistryError;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::manifest::ExecutionPlan;
use crate::manifest::Fingerprints;
use crate::manifest::Manifest;
use crate::manifest::ManifestError;
use crate::manifest::ManifestMeta;
use crate::manifest::ManifestMetadata;
use crate::manifest::ManifestPipeline;
use crate::manifest::ManifestStep;
use crate::manifest::PlanStep;
use crate::manifest::RunSummary;
use crate::manifest::ToolchainInfo;
use crate::oml::OmlDocument;
use crate::oml::OmlParseError;
use crate::validate::OmlIssue;
use crate::validate::ValidatedPipeline;
use crate::validate::codes;
use crate::validate::validate_pipeline;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Compiler version recorded in fingerprints and toolchain metadata.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run-id placeholder recorded in manifest metadata.
pub const RUN_ID_PLACEHOLDER: &str = "${run_id}";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised during compilation.
///
/// # Invariants
/// - Variants are stable for CLI exit-code mapping.
#[derive(Debug, Error)]
pub enum CompileError {
    /// OML parsing failed.
    #[error(transparent)]
    Parse(#[from] OmlParseError),
    /// OML validation failed.
    #[error("oml validation failed with {} issue(s)", issues.len())]
    OmlInvalid {
        /// Validation findings.
        issues: Vec<OmlIssue>,
    },
    /// A referenced component is missing from the registry.
    #[error("component not found: {0}")]
    ComponentNotFound(String),
    /// A step config failed schema validation.
    #[error("step config invalid: {0}")]
    StepConfigInvalid(String),
    /// The step graph contains a cycle.
    #[error("dependency cycle detected: {0}")]
    CycleDetected(String),
    /// A `${params.*}` reference has no provided value.
    #[error("unresolved parameter {name:?} in step {step:?}")]
    UnresolvedParam {
        /// Step id containing the reference.
        step: String,
        /// Parameter name.
        name: String,
    },
    /// Build artifact write failed.
    #[error("build write failed for {path}: {message}")]
    WriteFailed {
        /// Path that failed.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },
    /// Canonical hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Path or pointer resolution failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Registry access failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Manifest loading or hashing failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

impl CompileError {
    /// Classifies a validation failure into the closest error variant.
    fn from_issues(issues: Vec<OmlIssue>) -> Self {
        if let Some(issue) = issues.iter().find(|issue| issue.id == codes::CYCLE) {
            return Self::CycleDetected(issue.message.clone());
        }
        if let Some(issue) = issues.iter().find(|issue| issue.id == codes::UNKNOWN_COMPONENT) {
            return Self::ComponentNotFound(issue.message.clone());
        }
        if let Some(issue) = issues.iter().find(|issue| issue.id == codes::CONFIG_INVALID) {
            return Self::StepConfigInvalid(issue.message.clone());
        }
        Self::OmlInvalid {
            issues,
        }
    }
}

// ============================================================================
// SECTION: Options & Outcome
// ============================================================================

/// Inputs accompanying one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Resolved profile for this invocation.
    pub profile: Profile,
    /// Parameter values substituted into `${params.*}` references.
    pub params: BTreeMap<String, String>,
}

/// Result of a successful compilation.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    /// The compiled manifest.
    pub manifest: Manifest,
    /// Full manifest hash.
    pub hash: ManifestHash,
    /// Short hash prefix used in directory names.
    pub short: ManifestShort,
    /// Resolved build artifact paths.
    pub paths: ManifestPaths,
}

// ============================================================================
// SECTION: Compiler
// ============================================================================

/// Compiles OML documents against a registry under a filesystem contract.
pub struct Compiler<'a> {
    /// Path resolution authority.
    contract: &'a FilesystemContract,
    /// Component registry.
    registry: &'a Registry,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler.
    #[must_use]
    pub const fn new(contract: &'a FilesystemContract, registry: &'a Registry) -> Self {
        Self {
            contract,
            registry,
        }
    }

    /// Compiles OML bytes into a build artifact directory.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] on validation or write failure; no partial
    /// build directory is left behind and `last_compile.txt` is unchanged.
    pub fn compile(
        &self,
        oml_bytes: &[u8],
        options: &CompileOptions,
    ) -> Result<CompileOutcome, CompileError> {
        let raw = OmlDocument::parse_raw(oml_bytes)?;
        let mut doc = OmlDocument::parse(oml_bytes)?;
        substitute_params(&mut doc, &options.params)?;
        let pipeline =
            validate_pipeline(&doc, self.registry).map_err(CompileError::from_issues)?;

        let fingerprints = self.fingerprints(&raw, options, &pipeline)?;
        let mut manifest = build_manifest(&doc, &pipeline, options, fingerprints);
        let hash_hex = manifest.compute_hash()?;
        manifest.pipeline.fingerprints.manifest_fp = hash_hex.clone();
        let hash = ManifestHash::parse(&hash_hex)
            .map_err(|err| CompileError::StepConfigInvalid(err.to_string()))?;
        let short = hash
            .short(self.contract.manifest_short_len())
            .map_err(|err| CompileError::StepConfigInvalid(err.to_string()))?;

        let paths =
            self.contract.manifest_paths(&pipeline.slug, &options.profile, &short, &hash)?;
        manifest.metadata.source_manifest_path = paths.manifest.display().to_string();

        self.write_build_dir(&manifest, &pipeline, &hash, &short, &paths, options)?;
        self.update_pointers(&pipeline, &paths, &hash, &options.profile)?;

        Ok(CompileOutcome {
            manifest,
            hash,
            short,
            paths,
        })
    }

    /// Computes the four input fingerprints.
    fn fingerprints(
        &self,
        raw_oml: &Value,
        options: &CompileOptions,
        pipeline: &ValidatedPipeline,
    ) -> Result<Fingerprints, CompileError> {
        let names: Vec<&str> =
            pipeline.steps.iter().map(|step| step.component.as_str()).collect();
        let snapshot = self.registry.snapshot(&names)?;
        let oml_fp = hash_canonical_json(raw_oml)?.hex;
        let params_fp = hash_canonical_json(&options.params)?.hex;
        let registry_fp = hash_canonical_json(&snapshot)?.hex;
        let compiler_fp = hash_canonical_json(&json!({
            "compiler_version": COMPILER_VERSION,
            "runtime_flags": Vec::<String>::new(),
        }))?
        .hex;
        Ok(Fingerprints {
            oml_fp,
            params_fp,
            registry_fp,
            compiler_fp,
            manifest_fp: String::new(),
        })
    }

    /// Stages and atomically publishes the build artifact directory.
    fn write_build_dir(
        &self,
        manifest: &Manifest,
        pipeline: &ValidatedPipeline,
        hash: &ManifestHash,
        short: &ManifestShort,
        paths: &ManifestPaths,
        options: &CompileOptions,
    ) -> Result<(), CompileError> {
        if paths.dir.exists() {
            // Same content hash: the directory is additive and immutable.
            return Ok(());
        }
        let parent = paths.dir.parent().ok_or_else(|| CompileError::WriteFailed {
            path: paths.dir.clone(),
            message: "build directory has no parent".to_string(),
        })?;
        ensure_dir(parent)?;
        let stage = parent.join(format!(".stage-{}", short.as_str()));
        if stage.exists() {
            fs::remove_dir_all(&stage).map_err(|err| CompileError::WriteFailed {
                path: stage.clone(),
                message: err.to_string(),
            })?;
        }
        let result = self.populate_stage(&stage, manifest, pipeline, hash, short, options);
        if let Err(err) = result {
            let _ = fs::remove_dir_all(&stage);
            return Err(err);
        }
        fs::rename(&stage, &paths.dir).map_err(|err| CompileError::WriteFailed {
            path: paths.dir.clone(),
            message: err.to_string(),
        })
    }

    /// Writes every build artifact into the stage directory.
    fn populate_stage(
        &self,
        stage: &Path,
        manifest: &Manifest,
        pipeline: &ValidatedPipeline,
        hash: &ManifestHash,
        short: &ManifestShort,
        options: &CompileOptions,
    ) -> Result<(), CompileError> {
        let names = &self.contract.config().filesystem.artifacts;
        ensure_dir(&stage.join(&names.cfg))?;

        let manifest_yaml = serde_yaml::to_string(manifest)
            .map_err(|err| CompileError::StepConfigInvalid(err.to_string()))?;
        write_stage_file(&stage.join(&names.manifest), manifest_yaml.as_bytes())?;

        let plan = ExecutionPlan {
            pipeline: pipeline.slug.as_str().to_string(),
            profile: options.profile.as_str().to_string(),
            manifest_hash: hash.as_str().to_string(),
            steps: manifest
                .pipeline
                .steps
                .iter()
                .map(|step| PlanStep {
                    id: step.id.clone(),
                    driver: step.driver.clone(),
                    cfg_path: step.cfg_path.clone(),
                    needs: step.needs.clone(),
                })
                .collect(),
        };
        write_stage_file(&stage.join(&names.plan), &json_lf(&plan)?)?;
        write_stage_file(
            &stage.join(&names.fingerprints),
            &json_lf(&manifest.pipeline.fingerprints)?,
        )?;
        let summary = RunSummary {
            compiled_at: manifest.meta.generated_at.clone(),
            profile: options.profile.as_str().to_string(),
            pipeline: pipeline.slug.as_str().to_string(),
            manifest_hash: hash.as_str().to_string(),
            manifest_short: short.as_str().to_string(),
            step_count: pipeline.steps.len(),
        };
        write_stage_file(&stage.join(&names.run_summary), &json_lf(&summary)?)?;

        for step in &pipeline.steps {
            let cfg_path = stage.join(&names.cfg).join(format!("{}.json", step.id));
            write_stage_file(&cfg_path, &json_lf(&step.config)?)?;
        }
        Ok(())
    }

    /// Replaces the LATEST pointer, the index latest pointer, and
    /// `last_compile.txt`.
    fn update_pointers(
        &self,
        pipeline: &ValidatedPipeline,
        paths: &ManifestPaths,
        hash: &ManifestHash,
        profile: &Profile,
    ) -> Result<(), CompileError> {
        let pointer = PointerFile {
            manifest_path: paths.manifest.clone(),
            hash: hash.clone(),
            profile: profile.clone(),
        };
        pointer.write(&paths.latest_ptr)?;
        let index = self.contract.index_paths();
        ensure_dir(&index.latest_dir)?;
        pointer.write(&index.latest_dir.join(format!("{}.txt", pipeline.slug.as_str())))?;
        ensure_dir(
            index.last_compile.parent().unwrap_or_else(|| Path::new("/")),
        )?;
        pointer.write(&index.last_compile)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Manifest Assembly
// ============================================================================

/// Assembles the manifest for a validated pipeline.
fn build_manifest(
    doc: &OmlDocument,
    pipeline: &ValidatedPipeline,
    options: &CompileOptions,
    fingerprints: Fingerprints,
) -> Manifest {
    let generated_at = format_rfc3339_millis(utc_now_ms()).unwrap_or_default();
    let steps = pipeline
        .topo_order
        .iter()
        .filter_map(|&index| pipeline.steps.get(index))
        .map(|step| ManifestStep {
            id: step.id.as_str().to_string(),
            driver: step.component.as_str().to_string(),
            mode: step.mode.as_str().to_string(),
            cfg_path: format!("cfg/{}.json", step.id),
            needs: step.depends_on.iter().map(|dep| dep.as_str().to_string()).collect(),
        })
        .collect();
    Manifest {
        meta: ManifestMeta {
            generated_at,
            oml_version: doc.oml_version.clone(),
            profile: options.profile.as_str().to_string(),
            run_id: RUN_ID_PLACEHOLDER.to_string(),
            toolchain: ToolchainInfo {
                compiler: COMPILER_VERSION.to_string(),
                oml_version: doc.oml_version.clone(),
            },
        },
        pipeline: ManifestPipeline {
            name: pipeline.name.clone(),
            slug: pipeline.slug.as_str().to_string(),
            fingerprints,
            steps,
        },
        metadata: ManifestMetadata {
            source_manifest_path: String::new(),
        },
    }
}

// ============================================================================
// SECTION: Param Substitution
// ============================================================================

/// Substitutes `${params.NAME}` references in every step config string.
fn substitute_params(
    doc: &mut OmlDocument,
    params: &BTreeMap<String, String>,
) -> Result<(), CompileError> {
    for step in &mut doc.steps {
        let step_id = step.id.clone();
        substitute_value(&mut step.config, params, &step_id)?;
    }
    Ok(())
}

/// Recursive substitution over a config value.
fn substitute_value(
    value: &mut Value,
    params: &BTreeMap<String, String>,
    step_id: &str,
) -> Result<(), CompileError> {
    match value {
        Value::String(text) => {
            if let Some(substituted) = substitute_text(text, params, step_id)? {
                *text = substituted;
            }
            Ok(())
        }
        Value::Object(map) => {
            for entry in map.values_mut() {
                substitute_value(entry, params, step_id)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                substitute_value(item, params, step_id)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Substitutes `${params.NAME}` spans inside one string.
///
/// Non-param placeholders (for example `${MYSQL_PASSWORD}`) pass through
/// untouched; those resolve inside the CLI connection boundary at run time.
fn substitute_text(
    text: &str,
    params: &BTreeMap<String, String>,
    step_id: &str,
) -> Result<Option<String>, CompileError> {
    const PREFIX: &str = "${params.";
    if !text.contains(PREFIX) {
        return Ok(None);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(PREFIX) {
        let (head, tail) = rest.split_at(start);
        out.push_str(head);
        let body = tail.get(PREFIX.len()..).unwrap_or("");
        let Some(end) = body.find('}') else {
            return Err(CompileError::UnresolvedParam {
                step: step_id.to_string(),
                name: body.to_string(),
            });
        };
        let name = body.get(..end).unwrap_or("");
        let Some(replacement) = params.get(name) else {
            return Err(CompileError::UnresolvedParam {
                step: step_id.to_string(),
                name: name.to_string(),
            });
        };
        out.push_str(replacement);
        rest = body.get(end + 1..).unwrap_or("");
    }
    out.push_str(rest);
    Ok(Some(out))
}

// ============================================================================
// SECTION: Write Helpers
// ============================================================================

/// Serializes a value as canonical JSON with a trailing LF.
fn json_lf<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CompileError> {
    let mut bytes = osiris_core::hashing::canonical_json_bytes(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Writes one staged file (temp name, then rename within the stage).
fn write_stage_file(path: &Path, bytes: &[u8]) -> Result<(), CompileError> {
    osiris_config::contract::replace_file(path, bytes).map_err(|err| CompileError::WriteFailed {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
