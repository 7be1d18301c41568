// crates/osiris-aiop/src/lib.rs
// ============================================================================
// Module: Osiris AIOP Library
// Description: Public API surface for audit package export and retention.
// Purpose: Expose the exporter, leak scanner, signer, and retention engine.
// Dependencies: crate::{export, leak, retention, sign}
// ============================================================================

//! ## Overview
//! The AIOP exporter collects one completed session's events, metrics,
//! artifacts, and manifest subset into a deterministic, size-bounded,
//! secret-free JSON-LD package with four layers (narrative, semantic,
//! evidence, control), optional NDJSON annex shards, and an optional
//! detached signature. The retention engine applies age and keep-count
//! policies to run logs and AIOP files without ever touching build
//! artifacts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod export;
pub mod leak;
pub mod narrative;
pub mod retention;
pub mod sign;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use export::AiopError;
pub use export::AiopExporter;
pub use export::ExportInput;
pub use export::ExportOutcome;
pub use retention::Action;
pub use retention::RetentionEngine;
pub use retention::RetentionPlan;
pub use retention::RetentionReport;
