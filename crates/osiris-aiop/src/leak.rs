// crates/osiris-aiop/src/leak.rs
// ============================================================================
// Module: AIOP Leak Scanner
// Description: Mandatory end-of-build secret scan for finished packages.
// Purpose: Reject any package carrying unmasked secrets or placeholders.
// Dependencies: osiris-core, serde_json
// ============================================================================

//! ## Overview
//! The scanner runs over the fully assembled core document immediately
//! before it is written. It reuses the shared redaction denylist, so a
//! value that survives under a secret-shaped key, or any raw `${VAR}`
//! placeholder, fails the export. The narrative layer is exempt from
//! placeholder matching only for the mask marker itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use osiris_core::redaction::LeakFinding;
use osiris_core::redaction::scan_for_leaks;
use serde_json::Value;

// ============================================================================
// SECTION: Scan
// ============================================================================

/// Scans a finished core document and returns every finding.
///
/// An empty result is the only acceptable outcome for export.
#[must_use]
pub fn scan_core(core: &Value) -> Vec<LeakFinding> {
    scan_for_leaks(core)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
