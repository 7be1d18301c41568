// crates/osiris-config/src/lib.rs
// ============================================================================
// Module: Osiris Config Library
// Description: Public API surface for configuration and path resolution.
// Purpose: Expose the osiris.yaml model and the filesystem contract.
// Dependencies: crate::{config, contract}
// ============================================================================

//! ## Overview
//! Everything path-shaped in Osiris flows through this crate: the typed
//! `osiris.yaml` model with `OSIRIS_*` environment overrides, and the
//! filesystem contract that renders tokenized directory templates into
//! absolute paths. Loading fails closed; once a contract exists, path
//! resolution is infallible.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod contract;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AiopAnnexConfig;
pub use config::AiopConfig;
pub use config::AnnexCompression;
pub use config::ArtifactNames;
pub use config::ConfigError;
pub use config::DeltaMode;
pub use config::FilesystemConfig;
pub use config::IdsConfig;
pub use config::NamingConfig;
pub use config::OsirisConfig;
pub use config::ProfilesConfig;
pub use config::RetentionConfig;
pub use config::RunIdFormat;
pub use config::TimelineDensity;
pub use contract::AiopPaths;
pub use contract::FilesystemContract;
pub use contract::IndexPaths;
pub use contract::ManifestPaths;
pub use contract::PointerFile;
pub use contract::RunLogPaths;
pub use contract::TemplateTokens;
