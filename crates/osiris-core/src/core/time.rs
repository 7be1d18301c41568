// crates/osiris-core/src/core/time.rs
// ============================================================================
// Module: Osiris Time Helpers
// Description: Single wall-clock helper and deterministic timestamp formats.
// Purpose: Keep every emitted timestamp flowing through one code path.
// Dependencies: thiserror, time
// ============================================================================

//! ## Overview
//! Osiris reads the wall clock in exactly one place, [`utc_now_ms`]. All
//! other time handling formats explicit millisecond values, so tests assert
//! format and monotonicity rather than clock behavior. Two formats exist:
//! RFC3339 UTC with millisecond precision for event streams, and the compact
//! `YYYYMMDDTHHMMSSZ` basic form used in run-log directory names.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when formatting timestamps.
#[derive(Debug, Error)]
pub enum TimeError {
    /// Millisecond value is outside the representable range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(i64),
    /// Formatting failed.
    #[error("timestamp formatting failed: {0}")]
    Format(String),
}

// ============================================================================
// SECTION: Wall Clock
// ============================================================================

/// Returns the current UTC time as unix epoch milliseconds.
///
/// This is the only wall-clock read in the workspace.
#[must_use]
pub fn utc_now_ms() -> i64 {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Formats epoch milliseconds as RFC3339 UTC with millisecond precision.
///
/// Example: `2026-02-01T09:30:00.123Z`.
///
/// # Errors
///
/// Returns [`TimeError`] when the value is out of range or formatting fails.
pub fn format_rfc3339_millis(unix_ms: i64) -> Result<String, TimeError> {
    let datetime = datetime_from_ms(unix_ms)?;
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    datetime.format(&format).map_err(|err| TimeError::Format(err.to_string()))
}

/// Formats epoch milliseconds as the compact `YYYYMMDDTHHMMSSZ` basic form.
///
/// Example: `20260201T093000Z`.
///
/// # Errors
///
/// Returns [`TimeError`] when the value is out of range or formatting fails.
pub fn format_iso_basic(unix_ms: i64) -> Result<String, TimeError> {
    let datetime = datetime_from_ms(unix_ms)?;
    let format = format_description!("[year][month][day]T[hour][minute][second]Z");
    datetime.format(&format).map_err(|err| TimeError::Format(err.to_string()))
}

/// Parses a timestamp produced by [`format_rfc3339_millis`] back to epoch
/// milliseconds.
///
/// # Errors
///
/// Returns [`TimeError::Format`] when the text does not match the emitted
/// shape.
pub fn parse_rfc3339_millis(text: &str) -> Result<i64, TimeError> {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    let parsed = time::PrimitiveDateTime::parse(text, &format)
        .map_err(|err| TimeError::Format(err.to_string()))?;
    let nanos = parsed.assume_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).map_err(|_| TimeError::Format(text.to_string()))
}

/// Parses a `YYYYMMDDTHHMMSSZ` basic timestamp back to epoch milliseconds.
///
/// # Errors
///
/// Returns [`TimeError::Format`] when the text does not match the emitted
/// shape.
pub fn parse_iso_basic(text: &str) -> Result<i64, TimeError> {
    let format = format_description!("[year][month][day]T[hour][minute][second]Z");
    let parsed = time::PrimitiveDateTime::parse(text, &format)
        .map_err(|err| TimeError::Format(err.to_string()))?;
    let nanos = parsed.assume_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).map_err(|_| TimeError::Format(text.to_string()))
}

/// Converts epoch milliseconds into an [`OffsetDateTime`].
fn datetime_from_ms(unix_ms: i64) -> Result<OffsetDateTime, TimeError> {
    let nanos = i128::from(unix_ms)
        .checked_mul(1_000_000)
        .ok_or(TimeError::OutOfRange(unix_ms))?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|_| TimeError::OutOfRange(unix_ms))
}

// ============================================================================
// SECTION: Monotonic Clamp
// ============================================================================

/// Clamps successive timestamps to be monotonic non-decreasing.
///
/// # Invariants
/// - `next` never returns a value smaller than any previously returned one.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    /// Greatest millisecond value handed out so far.
    last_ms: i64,
}

impl MonotonicClock {
    /// Creates a clamp starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_ms: 0,
        }
    }

    /// Returns `candidate_ms` clamped against previously returned values.
    pub fn next(&mut self, candidate_ms: i64) -> i64 {
        if candidate_ms > self.last_ms {
            self.last_ms = candidate_ms;
        }
        self.last_ms
    }

    /// Returns the current wall clock clamped monotonic.
    pub fn now(&mut self) -> i64 {
        self.next(utc_now_ms())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
