// crates/osiris-cli/src/output.rs
// ============================================================================
// Module: CLI Output
// Description: Stream writers for user-facing CLI output.
// Purpose: Route all terminal writes through checked handles.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! All user-facing output flows through these helpers so write failures
//! surface as results instead of panics and so machine-readable `--json`
//! output stays on stdout with human diagnostics on stderr.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;

use serde::Serialize;

// ============================================================================
// SECTION: Writers
// ============================================================================

/// Writes one line to stdout.
pub fn stdout_line(line: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(line.as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()
}

/// Writes one line to stderr.
pub fn stderr_line(line: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    stderr.write_all(line.as_bytes())?;
    stderr.write_all(b"\n")?;
    stderr.flush()
}

/// Writes a value as pretty JSON to stdout.
pub fn stdout_json<T: Serialize>(value: &T) -> std::io::Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    stdout_line(&rendered)
}
