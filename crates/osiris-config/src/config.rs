// crates/osiris-config/src/config.rs
// ============================================================================
// Module: Osiris Configuration
// Description: Configuration loading and validation for osiris.yaml.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: osiris-core, serde, serde_yaml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a YAML file with strict size limits and
//! validated before any path is resolved. Precedence is CLI flag over
//! `OSIRIS_*` environment variable over config file over built-in default;
//! this module implements the env and file layers, the CLI applies its flags
//! on top. Missing or invalid configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use osiris_core::Profile;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "osiris.yaml";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Environment variable prefix recognized for overrides.
pub const ENV_PREFIX: &str = "OSIRIS_";
/// Tokens recognized inside naming templates.
pub const TEMPLATE_TOKENS: &[&str] = &[
    "pipeline_slug",
    "profile",
    "manifest_short",
    "manifest_hash",
    "run_ts",
    "run_id",
    "session_id",
];
/// Minimum accepted manifest short length.
pub const MIN_MANIFEST_SHORT_LEN: usize = 4;
/// Maximum accepted manifest short length.
pub const MAX_MANIFEST_SHORT_LEN: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or validating configuration.
///
/// # Invariants
/// - Variants are stable for programmatic handling; all map to the CONFIG
///   error family.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config read failed for {path}: {message}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O message.
        message: String,
    },
    /// Config file exceeds the size limit.
    #[error("config file too large: {size} bytes (max {MAX_CONFIG_FILE_SIZE})")]
    TooLarge {
        /// Observed file size.
        size: usize,
    },
    /// YAML parsing failed.
    #[error("config parse failed: {0}")]
    Parse(String),
    /// `base_path` is empty or relative.
    #[error("filesystem.base_path must be an absolute path, got {0:?}")]
    BasePath(String),
    /// A template references an unknown token.
    #[error("template {template:?} references unknown token {{{token}}}")]
    UnknownToken {
        /// Offending template text.
        template: String,
        /// Unknown token name.
        token: String,
    },
    /// The default profile is not listed in `profiles.values`.
    #[error("profiles.default {default:?} is not listed in profiles.values")]
    DefaultProfileNotListed {
        /// Configured default profile.
        default: String,
    },
    /// A field holds a value outside the supported set.
    #[error("{field} has unsupported value {value:?} (supported: {supported})")]
    Unsupported {
        /// Dotted config field path.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Human-readable supported set.
        supported: &'static str,
    },
    /// Cross-field or range validation failed.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Filesystem Section
// ============================================================================

/// Profile configuration.
///
/// # Invariants
/// - When `enabled`, `default` must be one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilesConfig {
    /// Whether profiles participate in path resolution.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Permitted profile labels.
    #[serde(default = "default_profile_values")]
    pub values: Vec<String>,
    /// Profile used when the CLI does not pass one.
    #[serde(default = "default_profile")]
    pub default: String,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            values: default_profile_values(),
            default: default_profile(),
        }
    }
}

/// Naming templates and formats for generated directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Template for manifest build directories.
    #[serde(default = "default_manifest_dir_template")]
    pub manifest_dir_template: String,
    /// Template for run-log directories.
    #[serde(default = "default_run_dir_template")]
    pub run_dir_template: String,
    /// Template for per-run AIOP directories.
    #[serde(default = "default_aiop_run_dir_template")]
    pub aiop_run_dir_template: String,
    /// Timestamp format label for `{run_ts}` (only `iso_basic_z`).
    #[serde(default = "default_run_ts_format")]
    pub run_ts_format: String,
    /// Number of hex characters in `{manifest_short}`.
    #[serde(default = "default_manifest_short_len")]
    pub manifest_short_len: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            manifest_dir_template: default_manifest_dir_template(),
            run_dir_template: default_run_dir_template(),
            aiop_run_dir_template: default_aiop_run_dir_template(),
            run_ts_format: default_run_ts_format(),
            manifest_short_len: default_manifest_short_len(),
        }
    }
}

/// File names used inside build and run directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactNames {
    /// Manifest file name.
    #[serde(default = "default_manifest_name")]
    pub manifest: String,
    /// Execution plan file name.
    #[serde(default = "default_plan_name")]
    pub plan: String,
    /// Fingerprints file name.
    #[serde(default = "default_fingerprints_name")]
    pub fingerprints: String,
    /// Run summary file name.
    #[serde(default = "default_run_summary_name")]
    pub run_summary: String,
    /// Per-step config subdirectory name.
    #[serde(default = "default_cfg_dir_name")]
    pub cfg: String,
    /// Number of trailing events copied into build artifacts (0 disables).
    #[serde(default)]
    pub save_events_tail: u32,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            manifest: default_manifest_name(),
            plan: default_plan_name(),
            fingerprints: default_fingerprints_name(),
            run_summary: default_run_summary_name(),
            cfg: default_cfg_dir_name(),
            save_events_tail: 0,
        }
    }
}

/// Retention policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Run-log directories older than this many days are deleted.
    #[serde(default = "default_run_logs_days")]
    pub run_logs_days: u32,
    /// Newest AIOP core files kept per pipeline.
    #[serde(default = "default_aiop_keep_runs")]
    pub aiop_keep_runs_per_pipeline: u32,
    /// Annex shards older than this many days are deleted.
    #[serde(default = "default_annex_keep_days")]
    pub annex_keep_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            run_logs_days: default_run_logs_days(),
            aiop_keep_runs_per_pipeline: default_aiop_keep_runs(),
            annex_keep_days: default_annex_keep_days(),
        }
    }
}

/// Driver output defaults (directory and format for writers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputsConfig {
    /// Directory for driver outputs, relative to the base path.
    #[serde(default = "default_outputs_directory")]
    pub directory: String,
    /// Default output format label.
    #[serde(default = "default_outputs_format")]
    pub format: String,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            directory: default_outputs_directory(),
            format: default_outputs_format(),
        }
    }
}

/// Filesystem section of `osiris.yaml`.
///
/// # Invariants
/// - `base_path` is absolute; every subdirectory is relative to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Absolute project base path.
    #[serde(default)]
    pub base_path: String,
    /// OML pipeline sources directory.
    #[serde(default = "default_pipelines_dir")]
    pub pipelines_dir: String,
    /// Build artifact directory.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
    /// AIOP export directory.
    #[serde(default = "default_aiop_dir")]
    pub aiop_dir: String,
    /// Run-log directory.
    #[serde(default = "default_run_logs_dir")]
    pub run_logs_dir: String,
    /// Conversation session scratch directory.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: String,
    /// Cache directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Run index directory.
    #[serde(default = "default_index_dir")]
    pub index_dir: String,
    /// MCP server log directory.
    #[serde(default = "default_mcp_logs_dir")]
    pub mcp_logs_dir: String,
    /// Profile configuration.
    #[serde(default)]
    pub profiles: ProfilesConfig,
    /// Naming templates.
    #[serde(default)]
    pub naming: NamingConfig,
    /// Artifact file names.
    #[serde(default)]
    pub artifacts: ArtifactNames,
    /// Retention policies.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Driver output defaults.
    #[serde(default)]
    pub outputs: OutputsConfig,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            pipelines_dir: default_pipelines_dir(),
            build_dir: default_build_dir(),
            aiop_dir: default_aiop_dir(),
            run_logs_dir: default_run_logs_dir(),
            sessions_dir: default_sessions_dir(),
            cache_dir: default_cache_dir(),
            index_dir: default_index_dir(),
            mcp_logs_dir: default_mcp_logs_dir(),
            profiles: ProfilesConfig::default(),
            naming: NamingConfig::default(),
            artifacts: ArtifactNames::default(),
            retention: RetentionConfig::default(),
            outputs: OutputsConfig::default(),
        }
    }
}

// ============================================================================
// SECTION: Ids Section
// ============================================================================

/// Supported run-id allocation formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunIdFormat {
    /// Monotonic per-pipeline counter backed by SQLite.
    Incremental,
    /// Process-monotonic ULID.
    Ulid,
}

/// Identifier section of `osiris.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdsConfig {
    /// Ordered run-id format preference; the first supported format wins.
    #[serde(default = "default_run_id_format")]
    pub run_id_format: Vec<RunIdFormat>,
    /// Manifest hash algorithm label (only `sha256_slug`).
    #[serde(default = "default_manifest_hash_algo")]
    pub manifest_hash_algo: String,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            run_id_format: default_run_id_format(),
            manifest_hash_algo: default_manifest_hash_algo(),
        }
    }
}

impl IdsConfig {
    /// Returns the first supported run-id format.
    #[must_use]
    pub fn resolve_run_id_format(&self) -> RunIdFormat {
        self.run_id_format.first().copied().unwrap_or(RunIdFormat::Incremental)
    }
}

// ============================================================================
// SECTION: AIOP Section
// ============================================================================

/// Timeline density presets for the AIOP evidence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineDensity {
    /// Errors and run/step boundaries only.
    Low,
    /// Boundaries plus notable driver events.
    Medium,
    /// Every event.
    High,
}

/// Delta computation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    /// Compare against the previous completed run of the same manifest.
    Previous,
    /// Do not compute deltas.
    None,
}

/// Annex compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnexCompression {
    /// No compression.
    None,
    /// Gzip via flate2.
    Gzip,
    /// Accepted by the parser, rejected at validation.
    Zstd,
}

/// Annex configuration for AIOP overflow shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiopAnnexConfig {
    /// Whether annex shards are written on truncation.
    #[serde(default)]
    pub enabled: bool,
    /// Annex subdirectory name.
    #[serde(default = "default_annex_dir")]
    pub dir: String,
    /// Annex compression codec.
    #[serde(default = "default_annex_compress")]
    pub compress: AnnexCompression,
}

impl Default for AiopAnnexConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_annex_dir(),
            compress: AnnexCompression::None,
        }
    }
}

/// AIOP retention knobs (mirrors `filesystem.retention` for AIOP files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiopRetentionConfig {
    /// Newest core files kept per pipeline.
    #[serde(default = "default_aiop_keep_runs")]
    pub keep_runs: u32,
    /// Annex shards older than this many days are deleted.
    #[serde(default = "default_annex_keep_days")]
    pub annex_keep_days: u32,
}

impl Default for AiopRetentionConfig {
    fn default() -> Self {
        Self {
            keep_runs: default_aiop_keep_runs(),
            annex_keep_days: default_annex_keep_days(),
        }
    }
}

/// Optional output path overrides for AIOP files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiopOutputConfig {
    /// Override for the core JSON path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_path: Option<String>,
    /// Override for the Markdown run-card path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_card_path: Option<String>,
}

/// Optional signing configuration for AIOP core files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiopSigningConfig {
    /// Path to an ed25519 signing key; signing is disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
}

/// AIOP section of `osiris.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiopConfig {
    /// Whether AIOP export runs after each run.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Export policy label (`core`, `annex`, or `custom`).
    #[serde(default = "default_aiop_policy")]
    pub policy: String,
    /// Maximum size of the core JSON in bytes.
    #[serde(default = "default_max_core_bytes")]
    pub max_core_bytes: usize,
    /// Timeline density preset.
    #[serde(default = "default_timeline_density")]
    pub timeline_density: TimelineDensity,
    /// Number of metrics kept by importance ranking.
    #[serde(default = "default_metrics_topk")]
    pub metrics_topk: usize,
    /// Schema detail mode (`summary` or `detailed`).
    #[serde(default = "default_schema_mode")]
    pub schema_mode: String,
    /// Delta computation mode.
    #[serde(default = "default_delta_mode")]
    pub delta: DeltaMode,
    /// Whether the Markdown run-card is written.
    #[serde(default = "default_true")]
    pub run_card: bool,
    /// Output path overrides.
    #[serde(default)]
    pub output: AiopOutputConfig,
    /// Annex configuration.
    #[serde(default)]
    pub annex: AiopAnnexConfig,
    /// AIOP retention.
    #[serde(default)]
    pub retention: AiopRetentionConfig,
    /// Optional signing configuration.
    #[serde(default)]
    pub signing: AiopSigningConfig,
}

impl Default for AiopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: default_aiop_policy(),
            max_core_bytes: default_max_core_bytes(),
            timeline_density: TimelineDensity::Medium,
            metrics_topk: default_metrics_topk(),
            schema_mode: default_schema_mode(),
            delta: DeltaMode::Previous,
            run_card: true,
            output: AiopOutputConfig::default(),
            annex: AiopAnnexConfig::default(),
            retention: AiopRetentionConfig::default(),
            signing: AiopSigningConfig::default(),
        }
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root of the `osiris.yaml` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsirisConfig {
    /// Filesystem section.
    #[serde(default)]
    pub filesystem: FilesystemConfig,
    /// Identifier section.
    #[serde(default)]
    pub ids: IdsConfig,
    /// AIOP section.
    #[serde(default)]
    pub aiop: AiopConfig,
}

impl OsirisConfig {
    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds the
    /// size limit, fails to parse, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                size: bytes.len(),
            });
        }
        let mut config: Self =
            serde_yaml::from_slice(&bytes).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides(&|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies `OSIRIS_*` environment overrides using the given lookup.
    ///
    /// The lookup indirection keeps override behavior testable without
    /// mutating process environment. Only a bounded set of variables is
    /// recognized; unknown `OSIRIS_*` variables are ignored.
    pub fn apply_env_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("OSIRIS_BASE_PATH") {
            self.filesystem.base_path = value;
        }
        if let Some(value) = lookup("OSIRIS_AIOP_ENABLED") {
            if let Ok(flag) = value.parse::<bool>() {
                self.aiop.enabled = flag;
            }
        }
        if let Some(value) = lookup("OSIRIS_AIOP_MAX_CORE_BYTES") {
            if let Ok(size) = value.parse::<usize>() {
                self.aiop.max_core_bytes = size;
            }
        }
        if let Some(value) = lookup("OSIRIS_AIOP_POLICY") {
            self.aiop.policy = value;
        }
        if let Some(value) = lookup("OSIRIS_AIOP_TIMELINE_DENSITY") {
            match value.as_str() {
                "low" => self.aiop.timeline_density = TimelineDensity::Low,
                "medium" => self.aiop.timeline_density = TimelineDensity::Medium,
                "high" => self.aiop.timeline_density = TimelineDensity::High,
                _ => {}
            }
        }
        if let Some(value) = lookup("OSIRIS_AIOP_METRICS_TOPK") {
            if let Ok(top_k) = value.parse::<usize>() {
                self.aiop.metrics_topk = top_k;
            }
        }
        if let Some(value) = lookup("OSIRIS_AIOP_DELTA") {
            match value.as_str() {
                "previous" => self.aiop.delta = DeltaMode::Previous,
                "none" => self.aiop.delta = DeltaMode::None,
                _ => {}
            }
        }
        if let Some(value) = lookup("OSIRIS_AIOP_RUN_CARD") {
            if let Ok(flag) = value.parse::<bool>() {
                self.aiop.run_card = flag;
            }
        }
        if let Some(value) = lookup("OSIRIS_AIOP_ANNEX_ENABLED") {
            if let Ok(flag) = value.parse::<bool>() {
                self.aiop.annex.enabled = flag;
            }
        }
        if let Some(value) = lookup("OSIRIS_RETENTION_RUN_LOGS_DAYS") {
            if let Ok(days) = value.parse::<u32>() {
                self.filesystem.retention.run_logs_days = days;
            }
        }
    }

    /// Validates the configuration, failing closed on any defect.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first defect found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = Path::new(&self.filesystem.base_path);
        if self.filesystem.base_path.is_empty() || !base.is_absolute() {
            return Err(ConfigError::BasePath(self.filesystem.base_path.clone()));
        }
        validate_template(&self.filesystem.naming.manifest_dir_template)?;
        validate_template(&self.filesystem.naming.run_dir_template)?;
        validate_template(&self.filesystem.naming.aiop_run_dir_template)?;
        if self.filesystem.naming.run_ts_format != "iso_basic_z" {
            return Err(ConfigError::Unsupported {
                field: "filesystem.naming.run_ts_format",
                value: self.filesystem.naming.run_ts_format.clone(),
                supported: "iso_basic_z",
            });
        }
        let short_len = self.filesystem.naming.manifest_short_len;
        if !(MIN_MANIFEST_SHORT_LEN..=MAX_MANIFEST_SHORT_LEN).contains(&short_len) {
            return Err(ConfigError::Invalid(format!(
                "filesystem.naming.manifest_short_len out of range: {short_len}"
            )));
        }
        if self.filesystem.profiles.enabled {
            for value in &self.filesystem.profiles.values {
                Profile::parse(value)
                    .map_err(|err| ConfigError::Invalid(format!("profiles.values: {err}")))?;
            }
            if !self.filesystem.profiles.values.contains(&self.filesystem.profiles.default) {
                return Err(ConfigError::DefaultProfileNotListed {
                    default: self.filesystem.profiles.default.clone(),
                });
            }
        }
        if self.ids.run_id_format.is_empty() {
            return Err(ConfigError::Invalid("ids.run_id_format must not be empty".to_string()));
        }
        if self.ids.manifest_hash_algo != "sha256_slug" {
            return Err(ConfigError::Unsupported {
                field: "ids.manifest_hash_algo",
                value: self.ids.manifest_hash_algo.clone(),
                supported: "sha256_slug",
            });
        }
        match self.aiop.policy.as_str() {
            "core" | "annex" | "custom" => {}
            other => {
                return Err(ConfigError::Unsupported {
                    field: "aiop.policy",
                    value: other.to_string(),
                    supported: "core, annex, custom",
                });
            }
        }
        match self.aiop.schema_mode.as_str() {
            "summary" | "detailed" => {}
            other => {
                return Err(ConfigError::Unsupported {
                    field: "aiop.schema_mode",
                    value: other.to_string(),
                    supported: "summary, detailed",
                });
            }
        }
        if self.aiop.annex.compress == AnnexCompression::Zstd {
            return Err(ConfigError::Unsupported {
                field: "aiop.annex.compress",
                value: "zstd".to_string(),
                supported: "none, gzip",
            });
        }
        if self.aiop.max_core_bytes == 0 {
            return Err(ConfigError::Invalid(
                "aiop.max_core_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves the effective profile for one invocation.
    ///
    /// Precedence: explicit CLI value, then the configured default, then
    /// the literal `default` when profiles are disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the requested profile is not a
    /// configured value or fails profile charset validation.
    pub fn resolve_profile(&self, requested: Option<&str>) -> Result<Profile, ConfigError> {
        let label = if self.filesystem.profiles.enabled {
            let label = requested.unwrap_or(&self.filesystem.profiles.default);
            if !self.filesystem.profiles.values.iter().any(|value| value == label) {
                return Err(ConfigError::Invalid(format!(
                    "profile {label:?} is not one of profiles.values"
                )));
            }
            label
        } else {
            requested.unwrap_or("default")
        };
        Profile::parse(label).map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

/// Validates that a template references only known tokens.
fn validate_template(template: &str) -> Result<(), ConfigError> {
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let tail = rest.get(start + 1..).unwrap_or("");
        let Some(end) = tail.find('}') else {
            return Err(ConfigError::UnknownToken {
                template: template.to_string(),
                token: tail.to_string(),
            });
        };
        let token = tail.get(..end).unwrap_or("");
        if !TEMPLATE_TOKENS.contains(&token) {
            return Err(ConfigError::UnknownToken {
                template: template.to_string(),
                token: token.to_string(),
            });
        }
        rest = tail.get(end + 1..).unwrap_or("");
    }
    Ok(())
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns `true` for serde defaults.
const fn default_true() -> bool {
    true
}

/// Default profile label.
fn default_profile() -> String {
    "dev".to_string()
}

/// Default profile value list.
fn default_profile_values() -> Vec<String> {
    vec!["dev".to_string(), "prod".to_string()]
}

/// Default manifest directory template.
fn default_manifest_dir_template() -> String {
    "{manifest_short}-{manifest_hash}".to_string()
}

/// Default run-log directory template.
fn default_run_dir_template() -> String {
    "{run_ts}_{run_id}-{manifest_short}".to_string()
}

/// Default AIOP run directory template.
fn default_aiop_run_dir_template() -> String {
    "{run_id}".to_string()
}

/// Default run timestamp format label.
fn default_run_ts_format() -> String {
    "iso_basic_z".to_string()
}

/// Default manifest short length.
const fn default_manifest_short_len() -> usize {
    7
}

/// Default pipelines directory.
fn default_pipelines_dir() -> String {
    "pipelines".to_string()
}

/// Default build directory.
fn default_build_dir() -> String {
    "build".to_string()
}

/// Default AIOP directory.
fn default_aiop_dir() -> String {
    "aiop".to_string()
}

/// Default run-log directory.
fn default_run_logs_dir() -> String {
    "run_logs".to_string()
}

/// Default sessions directory.
fn default_sessions_dir() -> String {
    ".osiris/sessions".to_string()
}

/// Default cache directory.
fn default_cache_dir() -> String {
    ".osiris/cache".to_string()
}

/// Default index directory.
fn default_index_dir() -> String {
    ".osiris/index".to_string()
}

/// Default MCP log directory.
fn default_mcp_logs_dir() -> String {
    ".osiris/mcp_logs".to_string()
}

/// Default manifest file name.
fn default_manifest_name() -> String {
    "manifest.yaml".to_string()
}

/// Default plan file name.
fn default_plan_name() -> String {
    "plan.json".to_string()
}

/// Default fingerprints file name.
fn default_fingerprints_name() -> String {
    "fingerprints.json".to_string()
}

/// Default run summary file name.
fn default_run_summary_name() -> String {
    "run_summary.json".to_string()
}

/// Default cfg subdirectory name.
fn default_cfg_dir_name() -> String {
    "cfg".to_string()
}

/// Default run-log retention in days.
const fn default_run_logs_days() -> u32 {
    7
}

/// Default AIOP keep count per pipeline.
const fn default_aiop_keep_runs() -> u32 {
    50
}

/// Default annex retention in days.
const fn default_annex_keep_days() -> u32 {
    14
}

/// Default outputs directory.
fn default_outputs_directory() -> String {
    "output".to_string()
}

/// Default outputs format.
fn default_outputs_format() -> String {
    "csv".to_string()
}

/// Default run-id format preference.
fn default_run_id_format() -> Vec<RunIdFormat> {
    vec![RunIdFormat::Incremental]
}

/// Default manifest hash algorithm label.
fn default_manifest_hash_algo() -> String {
    "sha256_slug".to_string()
}

/// Default AIOP policy label.
fn default_aiop_policy() -> String {
    "core".to_string()
}

/// Default AIOP core size bound.
const fn default_max_core_bytes() -> usize {
    300_000
}

/// Default timeline density.
const fn default_timeline_density() -> TimelineDensity {
    TimelineDensity::Medium
}

/// Default metrics top-K.
const fn default_metrics_topk() -> usize {
    100
}

/// Default schema mode label.
fn default_schema_mode() -> String {
    "summary".to_string()
}

/// Default delta mode.
const fn default_delta_mode() -> DeltaMode {
    DeltaMode::Previous
}

/// Default annex directory name.
fn default_annex_dir() -> String {
    "annex".to_string()
}

/// Default annex compression.
const fn default_annex_compress() -> AnnexCompression {
    AnnexCompression::None
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
