// crates/osiris-core/src/core/identifiers.rs
// ============================================================================
// Module: Osiris Identifiers
// Description: Canonical typed identifiers for pipelines, runs, and manifests.
// Purpose: Enforce charset and length invariants at construction boundaries.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! This module defines the identifiers used throughout Osiris. Identifiers
//! that participate in filesystem paths (slugs, step ids, profiles) validate
//! their charset at construction so that no path discipline check is needed
//! downstream. Purely opaque identifiers (session ids, correlation ids)
//! serialize as plain strings on the wire.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a pipeline slug in characters.
pub const MAX_SLUG_LENGTH: usize = 63;
/// Maximum length of a step identifier in characters.
pub const MAX_STEP_ID_LENGTH: usize = 63;
/// Default number of hex characters in a manifest short prefix.
pub const DEFAULT_MANIFEST_SHORT_LEN: usize = 7;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when constructing validated identifiers.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Input produced an empty identifier.
    #[error("{what} is empty after normalization")]
    Empty {
        /// Identifier kind being constructed.
        what: &'static str,
    },
    /// Input contains characters outside the permitted charset.
    #[error("{what} contains invalid characters: {value:?}")]
    InvalidCharset {
        /// Identifier kind being constructed.
        what: &'static str,
        /// Offending input value.
        value: String,
    },
    /// Input exceeds the maximum permitted length.
    #[error("{what} exceeds {max} characters: {value:?}")]
    TooLong {
        /// Identifier kind being constructed.
        what: &'static str,
        /// Maximum permitted length.
        max: usize,
        /// Offending input value.
        value: String,
    },
    /// Input uses a reserved or rejected literal.
    #[error("{what} uses reserved value {value:?}")]
    Reserved {
        /// Identifier kind being constructed.
        what: &'static str,
        /// Offending input value.
        value: String,
    },
}

// ============================================================================
// SECTION: Pipeline Slug
// ============================================================================

/// Filesystem-safe slug derived from a pipeline name.
///
/// # Invariants
/// - Matches `[a-z0-9]([a-z0-9-]*[a-z0-9])?`.
/// - At most [`MAX_SLUG_LENGTH`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineSlug(String);

impl PipelineSlug {
    /// Derives a slug from a free-form pipeline name.
    ///
    /// Lowercases the input, collapses every run of non-alphanumeric
    /// characters to a single `-`, trims leading and trailing dashes, and
    /// truncates to [`MAX_SLUG_LENGTH`] characters on a character boundary.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::Empty`] when nothing survives
    /// normalization.
    pub fn derive(name: &str) -> Result<Self, IdentifierError> {
        let mut slug = String::with_capacity(name.len());
        let mut pending_dash = false;
        for ch in name.chars() {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(lower);
            } else {
                pending_dash = true;
            }
        }
        let truncated: String = slug.chars().take(MAX_SLUG_LENGTH).collect();
        let trimmed = truncated.trim_matches('-').to_string();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty {
                what: "pipeline slug",
            });
        }
        Ok(Self(trimmed))
    }

    /// Parses a value that must already be a valid slug.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is empty, too long, or
    /// contains characters outside the slug charset.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        if value.is_empty() {
            return Err(IdentifierError::Empty {
                what: "pipeline slug",
            });
        }
        if value.len() > MAX_SLUG_LENGTH {
            return Err(IdentifierError::TooLong {
                what: "pipeline slug",
                max: MAX_SLUG_LENGTH,
                value: value.to_string(),
            });
        }
        let valid = value.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
            && !value.starts_with('-')
            && !value.ends_with('-');
        if !valid {
            return Err(IdentifierError::InvalidCharset {
                what: "pipeline slug",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Profile
// ============================================================================

/// Environment profile label participating in every contract path.
///
/// # Invariants
/// - Non-empty; never the literal `None` (a historical defect value).
/// - Matches `[a-z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(String);

impl Profile {
    /// Parses a profile label.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the label is empty, reserved, or
    /// contains characters outside `[a-z0-9_-]`.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        if value.is_empty() {
            return Err(IdentifierError::Empty {
                what: "profile",
            });
        }
        if value == "None" {
            return Err(IdentifierError::Reserved {
                what: "profile",
                value: value.to_string(),
            });
        }
        let valid = value
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');
        if !valid {
            return Err(IdentifierError::InvalidCharset {
                what: "profile",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the profile label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Step Identifier
// ============================================================================

/// Step identifier unique within one pipeline.
///
/// # Invariants
/// - Matches `[a-z0-9][a-z0-9_-]{0,62}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Parses a step identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value does not match
    /// `[a-z0-9][a-z0-9_-]{0,62}`.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(IdentifierError::Empty {
                what: "step id",
            });
        };
        if value.len() > MAX_STEP_ID_LENGTH {
            return Err(IdentifierError::TooLong {
                what: "step id",
                max: MAX_STEP_ID_LENGTH,
                value: value.to_string(),
            });
        }
        let head_valid = first.is_ascii_lowercase() || first.is_ascii_digit();
        let tail_valid = chars.all(|ch| {
            ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-'
        });
        if !head_valid || !tail_valid {
            return Err(IdentifierError::InvalidCharset {
                what: "step id",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Component Name
// ============================================================================

/// Component name of the form `family.kind` (e.g. `mysql.extractor`).
///
/// # Invariants
/// - Two or more non-empty dot-separated segments of `[a-z0-9_]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentName(String);

impl ComponentName {
    /// Parses a component name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the name has fewer than two
    /// segments or a segment uses characters outside `[a-z0-9_]`.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        if value.is_empty() {
            return Err(IdentifierError::Empty {
                what: "component name",
            });
        }
        let segments: Vec<&str> = value.split('.').collect();
        let segments_valid = segments.len() >= 2
            && segments.iter().all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
            });
        if !segments_valid {
            return Err(IdentifierError::InvalidCharset {
                what: "component name",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the family segment (text before the first dot).
    #[must_use]
    pub fn family(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Connection Reference
// ============================================================================

/// Symbolic connection handle of the form `@family.alias`.
///
/// Connection references never carry credentials; resolution to concrete
/// secrets happens exclusively inside the CLI boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionRef {
    /// Connection family (e.g. `mysql`).
    family: String,
    /// Connection alias within the family (e.g. `default`).
    alias: String,
}

impl ConnectionRef {
    /// Parses a `@family.alias` token.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the token is missing the `@`
    /// prefix, has a segment count other than two, or uses characters
    /// outside `[a-z0-9_]`.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let Some(body) = value.strip_prefix('@') else {
            return Err(IdentifierError::InvalidCharset {
                what: "connection reference",
                value: value.to_string(),
            });
        };
        let mut segments = body.split('.');
        let (Some(family), Some(alias), None) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(IdentifierError::InvalidCharset {
                what: "connection reference",
                value: value.to_string(),
            });
        };
        let segment_valid = |segment: &str| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
        };
        if !segment_valid(family) || !segment_valid(alias) {
            return Err(IdentifierError::InvalidCharset {
                what: "connection reference",
                value: value.to_string(),
            });
        }
        Ok(Self {
            family: family.to_string(),
            alias: alias.to_string(),
        })
    }

    /// Returns true when the value looks like a connection reference token.
    #[must_use]
    pub fn is_reference(value: &str) -> bool {
        value.starts_with('@')
    }

    /// Returns the connection family.
    #[must_use]
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Returns the connection alias.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}.{}", self.family, self.alias)
    }
}

// ============================================================================
// SECTION: Run Identifier
// ============================================================================

/// Monotonic run identifier scoped to one pipeline and profile.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(NonZeroU64);

impl RunId {
    /// Creates a run identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a run identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Returns the zero-padded six-digit rendering used in session ids.
    #[must_use]
    pub fn padded(self) -> String {
        format!("{:06}", self.0.get())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

// ============================================================================
// SECTION: Session Identifier
// ============================================================================

/// Globally unique session identifier for one run attempt.
///
/// # Invariants
/// - Composed form is `run-{run_id:06}-{ulid}-{manifest_short}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Composes a session identifier from its parts.
    #[must_use]
    pub fn compose(run_id: RunId, ulid: &str, short: &ManifestShort) -> Self {
        Self(format!("run-{}-{}-{}", run_id.padded(), ulid, short.as_str()))
    }

    /// Wraps an existing session identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Manifest Hash
// ============================================================================

/// Full content hash of a compiled manifest.
///
/// # Invariants
/// - Exactly 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestHash(String);

impl ManifestHash {
    /// Parses a 64-character lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidCharset`] when the value is not
    /// 64 lowercase hex characters.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let valid = value.len() == 64 && value.chars().all(|ch| matches!(ch, '0'..='9' | 'a'..='f'));
        if !valid {
            return Err(IdentifierError::InvalidCharset {
                what: "manifest hash",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the short prefix of the configured length.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::TooLong`] when `len` exceeds the digest
    /// length.
    pub fn short(&self, len: usize) -> Result<ManifestShort, IdentifierError> {
        let Some(prefix) = self.0.get(..len) else {
            return Err(IdentifierError::TooLong {
                what: "manifest short",
                max: self.0.len(),
                value: len.to_string(),
            });
        };
        ManifestShort::parse(prefix)
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifestHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Short hex prefix of a manifest hash used in directory names.
///
/// # Invariants
/// - Non-empty lowercase hex, at most 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestShort(String);

impl ManifestShort {
    /// Parses a lowercase hex prefix.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is empty, longer than a
    /// full digest, or not lowercase hex.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        if value.is_empty() {
            return Err(IdentifierError::Empty {
                what: "manifest short",
            });
        }
        if value.len() > 64 {
            return Err(IdentifierError::TooLong {
                what: "manifest short",
                max: 64,
                value: value.to_string(),
            });
        }
        let valid = value.chars().all(|ch| matches!(ch, '0'..='9' | 'a'..='f'));
        if !valid {
            return Err(IdentifierError::InvalidCharset {
                what: "manifest short",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    /// Returns the prefix as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifestShort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Correlation Identifier
// ============================================================================

/// Correlation identifier propagated from the MCP bridge into telemetry.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Creates a new correlation identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
