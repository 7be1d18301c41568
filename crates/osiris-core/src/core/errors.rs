// crates/osiris-core/src/core/errors.rs
// ============================================================================
// Module: Osiris Error Families
// Description: Family taxonomy shared by CLI exit codes and MCP errors.
// Purpose: Give every surfaced error a stable, mappable classification.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each layer raises its own `thiserror` enums; at surface boundaries those
//! map into one of the families below. The CLI maps families to process exit
//! codes and the MCP server embeds the family label in structured error
//! payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Family
// ============================================================================

/// Stable error families used throughout the core.
///
/// # Invariants
/// - Labels and exit-code mappings are stable for scripts and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorFamily {
    /// Missing or invalid configuration; fatal at startup.
    Config,
    /// OML or JSON-Schema validation failure.
    Schema,
    /// DAG cycle, unknown component, or unknown reference.
    Semantic,
    /// Build artifact write failure or internal hash mismatch.
    Compile,
    /// Driver error, cancellation, timeout, or remote crash.
    Run,
    /// SQLite or filesystem I/O failure, contention exhausted.
    Storage,
    /// Secret leak detected or consent missing.
    Security,
    /// Payload too large or retention refused.
    Policy,
}

impl ErrorFamily {
    /// Returns the stable uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "CONFIG",
            Self::Schema => "SCHEMA",
            Self::Semantic => "SEMANTIC",
            Self::Compile => "COMPILE",
            Self::Run => "RUN",
            Self::Storage => "STORAGE",
            Self::Security => "SECURITY",
            Self::Policy => "POLICY",
        }
    }

    /// Returns the CLI process exit code for this family.
    ///
    /// Mapping: 0 ok (not represented here), 2 validation/schema,
    /// 3 compile, 4 run, 5 config, 1 internal/other.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Schema | Self::Semantic => 2,
            Self::Compile => 3,
            Self::Run => 4,
            Self::Config => 5,
            Self::Storage | Self::Security | Self::Policy => 1,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
