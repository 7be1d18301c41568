// crates/osiris-config/src/contract.rs
// ============================================================================
// Module: Osiris Filesystem Contract
// Description: Single source of truth for every path the core touches.
// Purpose: Resolve tokenized templates into absolute, validated paths.
// Dependencies: osiris-core, serde
// ============================================================================

//! ## Overview
//! The contract is constructed once from a validated [`OsirisConfig`] and
//! afterwards resolves paths infallibly. All returned paths are absolute and
//! stay inside the configured base path. Directory creation is idempotent,
//! pointer files are replaced atomically (write to temp, rename), and the
//! three-line pointer format is parsed and enforced here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use osiris_core::ManifestHash;
use osiris_core::ManifestShort;
use osiris_core::PipelineSlug;
use osiris_core::Profile;
use osiris_core::RunId;

use crate::config::ConfigError;
use crate::config::OsirisConfig;
use crate::config::TEMPLATE_TOKENS;

// ============================================================================
// SECTION: Path Bundles
// ============================================================================

/// Resolved paths for one build artifact directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    /// Build directory for this manifest.
    pub dir: PathBuf,
    /// Manifest file path.
    pub manifest: PathBuf,
    /// Execution plan path.
    pub plan: PathBuf,
    /// Fingerprints path.
    pub fingerprints: PathBuf,
    /// Run summary path.
    pub run_summary: PathBuf,
    /// Per-step config directory.
    pub cfg_dir: PathBuf,
    /// Sibling `LATEST` pointer file.
    pub latest_ptr: PathBuf,
}

/// Resolved paths for one run-log directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogPaths {
    /// Run-log directory.
    pub dir: PathBuf,
    /// Event stream path.
    pub events: PathBuf,
    /// Metric stream path.
    pub metrics: PathBuf,
    /// Human-readable log path.
    pub log: PathBuf,
    /// Status document path.
    pub status: PathBuf,
    /// Manifest copy path.
    pub manifest_copy: PathBuf,
    /// Step artifact root.
    pub artifacts_dir: PathBuf,
    /// Per-step config directory copy.
    pub cfg_dir: PathBuf,
}

/// Resolved paths for one AIOP export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiopPaths {
    /// Per-run AIOP directory.
    pub dir: PathBuf,
    /// Core JSON path.
    pub core: PathBuf,
    /// Markdown run-card path.
    pub run_card: PathBuf,
    /// Annex shard directory.
    pub annex_dir: PathBuf,
}

/// Resolved paths for the run index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    /// Global append-only NDJSON record file.
    pub runs_jsonl: PathBuf,
    /// Per-pipeline shard directory.
    pub by_pipeline_dir: PathBuf,
    /// Latest-pointer directory.
    pub latest_dir: PathBuf,
    /// Last compile pointer file.
    pub last_compile: PathBuf,
    /// SQLite counter store.
    pub counters_db: PathBuf,
}

// ============================================================================
// SECTION: Template Tokens
// ============================================================================

/// Token values available for template rendering.
///
/// # Invariants
/// - Every populated token renders verbatim; templates referencing an
///   unpopulated or unknown token fail loud.
#[derive(Debug, Clone, Default)]
pub struct TemplateTokens {
    /// `{pipeline_slug}` value.
    pub pipeline_slug: Option<String>,
    /// `{profile}` value.
    pub profile: Option<String>,
    /// `{manifest_short}` value.
    pub manifest_short: Option<String>,
    /// `{manifest_hash}` value.
    pub manifest_hash: Option<String>,
    /// `{run_ts}` value.
    pub run_ts: Option<String>,
    /// `{run_id}` value.
    pub run_id: Option<String>,
    /// `{session_id}` value.
    pub session_id: Option<String>,
}

impl TemplateTokens {
    /// Returns the value for a token name, when populated.
    #[must_use]
    fn get(&self, token: &str) -> Option<&str> {
        match token {
            "pipeline_slug" => self.pipeline_slug.as_deref(),
            "profile" => self.profile.as_deref(),
            "manifest_short" => self.manifest_short.as_deref(),
            "manifest_hash" => self.manifest_hash.as_deref(),
            "run_ts" => self.run_ts.as_deref(),
            "run_id" => self.run_id.as_deref(),
            "session_id" => self.session_id.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Pointer Files
// ============================================================================

/// Three-line pointer file recording the newest build or run.
///
/// # Invariants
/// - Line 1 is an absolute manifest path; line 2 is a 64-hex hash; line 3
///   is a configured profile label (never the literal `None`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerFile {
    /// Absolute path to the manifest file.
    pub manifest_path: PathBuf,
    /// Full manifest hash.
    pub hash: ManifestHash,
    /// Profile label.
    pub profile: Profile,
}

impl PointerFile {
    /// Encodes the pointer as three LF-terminated lines.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}\n{}\n{}\n",
            self.manifest_path.display(),
            self.hash.as_str(),
            self.profile.as_str()
        )
    }

    /// Parses a pointer file's contents.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the file does not hold exactly
    /// three lines, the path is relative, the hash is malformed, or the
    /// profile line holds the rejected literal `None`.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let lines: Vec<&str> = contents.lines().collect();
        if lines.len() != 3 {
            return Err(ConfigError::Invalid(format!(
                "pointer file must hold exactly 3 lines, got {}",
                lines.len()
            )));
        }
        let manifest_path = PathBuf::from(lines[0]);
        if !manifest_path.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "pointer manifest path must be absolute: {}",
                lines[0]
            )));
        }
        let hash = ManifestHash::parse(lines[1])
            .map_err(|err| ConfigError::Invalid(format!("pointer hash: {err}")))?;
        let profile = Profile::parse(lines[2])
            .map_err(|err| ConfigError::Invalid(format!("pointer profile: {err}")))?;
        Ok(Self {
            manifest_path,
            hash,
            profile,
        })
    }

    /// Reads and parses a pointer file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(&contents)
    }

    /// Atomically replaces a pointer file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the write or rename fails.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        replace_file(path, self.encode().as_bytes())
    }
}

// ============================================================================
// SECTION: Atomic Writes
// ============================================================================

/// Atomically replaces `path` with `bytes` (write temp, then rename).
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the temp write or rename fails.
pub fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), ConfigError> {
    let io_err = |message: String| ConfigError::Io {
        path: path.to_path_buf(),
        message,
    };
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io_err("path has no file name".to_string()))?;
    let temp_path = path.with_file_name(format!("{file_name}.tmp"));
    {
        let mut file = fs::File::create(&temp_path).map_err(|err| io_err(err.to_string()))?;
        file.write_all(bytes).map_err(|err| io_err(err.to_string()))?;
        file.sync_all().map_err(|err| io_err(err.to_string()))?;
    }
    fs::rename(&temp_path, path).map_err(|err| io_err(err.to_string()))
}

/// Creates a directory (with parents) idempotently.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when creation fails for a reason other than
/// the directory already existing.
pub fn ensure_dir(path: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

// ============================================================================
// SECTION: Filesystem Contract
// ============================================================================

/// Resolves every path the core touches from one validated config.
#[derive(Debug, Clone)]
pub struct FilesystemContract {
    /// Validated configuration backing this contract.
    config: OsirisConfig,
    /// Absolute base path.
    base: PathBuf,
}

impl FilesystemContract {
    /// Builds a contract from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn load(config: OsirisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let base = PathBuf::from(&config.filesystem.base_path);
        Ok(Self {
            config,
            base,
        })
    }

    /// Returns the backing configuration.
    #[must_use]
    pub const fn config(&self) -> &OsirisConfig {
        &self.config
    }

    /// Returns the absolute base path.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Returns the configured manifest short length.
    #[must_use]
    pub const fn manifest_short_len(&self) -> usize {
        self.config.filesystem.naming.manifest_short_len
    }

    /// Returns the absolute OML pipelines directory.
    #[must_use]
    pub fn pipelines_dir(&self) -> PathBuf {
        self.base.join(&self.config.filesystem.pipelines_dir)
    }

    /// Returns the absolute components directory (under the base path).
    #[must_use]
    pub fn components_dir(&self) -> PathBuf {
        self.base.join("components")
    }

    /// Returns the absolute MCP log directory.
    #[must_use]
    pub fn mcp_logs_dir(&self) -> PathBuf {
        self.base.join(&self.config.filesystem.mcp_logs_dir)
    }

    /// Renders a template against populated token values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownToken`] when the template references a
    /// token that is unknown or unpopulated.
    pub fn render(template: &str, tokens: &TemplateTokens) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            let (head, tail) = rest.split_at(start);
            out.push_str(head);
            let body = tail.get(1..).unwrap_or("");
            let Some(end) = body.find('}') else {
                return Err(ConfigError::UnknownToken {
                    template: template.to_string(),
                    token: body.to_string(),
                });
            };
            let token = body.get(..end).unwrap_or("");
            let known = TEMPLATE_TOKENS.contains(&token);
            match tokens.get(token) {
                Some(value) if known => out.push_str(value),
                _ => {
                    return Err(ConfigError::UnknownToken {
                        template: template.to_string(),
                        token: token.to_string(),
                    });
                }
            }
            rest = body.get(end + 1..).unwrap_or("");
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Resolves build artifact paths for one manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configured template fails to render.
    pub fn manifest_paths(
        &self,
        slug: &PipelineSlug,
        profile: &Profile,
        short: &ManifestShort,
        hash: &ManifestHash,
    ) -> Result<ManifestPaths, ConfigError> {
        let tokens = TemplateTokens {
            pipeline_slug: Some(slug.as_str().to_string()),
            profile: Some(profile.as_str().to_string()),
            manifest_short: Some(short.as_str().to_string()),
            manifest_hash: Some(hash.as_str().to_string()),
            ..TemplateTokens::default()
        };
        let dir_name =
            Self::render(&self.config.filesystem.naming.manifest_dir_template, &tokens)?;
        let pipeline_dir = self
            .base
            .join(&self.config.filesystem.build_dir)
            .join("pipelines")
            .join(profile.as_str())
            .join(slug.as_str());
        let dir = pipeline_dir.join(dir_name);
        let names = &self.config.filesystem.artifacts;
        Ok(ManifestPaths {
            manifest: dir.join(&names.manifest),
            plan: dir.join(&names.plan),
            fingerprints: dir.join(&names.fingerprints),
            run_summary: dir.join(&names.run_summary),
            cfg_dir: dir.join(&names.cfg),
            latest_ptr: pipeline_dir.join("LATEST"),
            dir,
        })
    }

    /// Resolves run-log paths for one run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configured template fails to render.
    pub fn run_log_paths(
        &self,
        slug: &PipelineSlug,
        profile: &Profile,
        run_ts: &str,
        run_id: RunId,
        short: &ManifestShort,
    ) -> Result<RunLogPaths, ConfigError> {
        let tokens = TemplateTokens {
            pipeline_slug: Some(slug.as_str().to_string()),
            profile: Some(profile.as_str().to_string()),
            manifest_short: Some(short.as_str().to_string()),
            run_ts: Some(run_ts.to_string()),
            run_id: Some(run_id.to_string()),
            ..TemplateTokens::default()
        };
        let dir_name = Self::render(&self.config.filesystem.naming.run_dir_template, &tokens)?;
        let dir = self
            .base
            .join(&self.config.filesystem.run_logs_dir)
            .join(profile.as_str())
            .join(slug.as_str())
            .join(dir_name);
        let names = &self.config.filesystem.artifacts;
        Ok(RunLogPaths {
            events: dir.join("events.jsonl"),
            metrics: dir.join("metrics.jsonl"),
            log: dir.join("osiris.log"),
            status: dir.join("status.json"),
            manifest_copy: dir.join(&names.manifest),
            artifacts_dir: dir.join("artifacts"),
            cfg_dir: dir.join(&names.cfg),
            dir,
        })
    }

    /// Resolves AIOP export paths for one run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configured template fails to render.
    pub fn aiop_paths(
        &self,
        slug: &PipelineSlug,
        profile: &Profile,
        short: &ManifestShort,
        hash: &ManifestHash,
        run_id: RunId,
    ) -> Result<AiopPaths, ConfigError> {
        let tokens = TemplateTokens {
            pipeline_slug: Some(slug.as_str().to_string()),
            profile: Some(profile.as_str().to_string()),
            manifest_short: Some(short.as_str().to_string()),
            manifest_hash: Some(hash.as_str().to_string()),
            run_id: Some(run_id.to_string()),
            ..TemplateTokens::default()
        };
        let manifest_dir =
            Self::render(&self.config.filesystem.naming.manifest_dir_template, &tokens)?;
        let run_dir =
            Self::render(&self.config.filesystem.naming.aiop_run_dir_template, &tokens)?;
        let dir = self
            .base
            .join(&self.config.filesystem.aiop_dir)
            .join(profile.as_str())
            .join(slug.as_str())
            .join(manifest_dir)
            .join(run_dir);
        Ok(AiopPaths {
            core: dir.join("core.json"),
            run_card: dir.join("run-card.md"),
            annex_dir: dir.join(&self.config.aiop.annex.dir),
            dir,
        })
    }

    /// Resolves the run index paths.
    #[must_use]
    pub fn index_paths(&self) -> IndexPaths {
        let index_dir = self.base.join(&self.config.filesystem.index_dir);
        IndexPaths {
            runs_jsonl: index_dir.join("runs.jsonl"),
            by_pipeline_dir: index_dir.join("by_pipeline"),
            latest_dir: index_dir.join("latest"),
            last_compile: index_dir.join("last_compile.txt"),
            counters_db: index_dir.join("counters.sqlite"),
        }
    }

    /// Returns true when `path` stays inside the contract base path.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.base)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
