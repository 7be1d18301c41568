// crates/osiris-core/src/core/redaction.rs
// ============================================================================
// Module: Osiris Secret Redaction
// Description: JSON-Pointer masking, field-name denylist, and leak scanning.
// Purpose: Keep secret values out of every emitted artifact, fail closed.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Redaction runs before any event, metric, artifact reference, or audit
//! layer is written. Two mechanisms compose: component-declared secret
//! pointers (JSON Pointers into step config) and a global field-name
//! denylist with prefix/suffix expansion. Raw `${VAR}` environment
//! placeholders are masked as well, so neither a resolved secret nor the
//! variable name that would resolve to one can appear in an artifact.
//! The leak scanner re-checks finished documents and reports findings for
//! the exporter to fail on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Replacement marker written in place of secret values.
pub const MASK: &str = "***MASKED***";

/// Field names that are always treated as secrets, regardless of component.
pub const FIELD_DENYLIST: &[&str] = &[
    "password",
    "token",
    "secret",
    "credential",
    "api_key",
    "auth",
    "authorization",
    "private_key",
];

// ============================================================================
// SECTION: Secret Map
// ============================================================================

/// Secret pointer map declared by one component spec.
///
/// # Invariants
/// - Entries are JSON Pointers into the component's config document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMap {
    /// Pointers to secret config fields.
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Additional pointers masked for defense in depth.
    #[serde(default)]
    pub redaction_extras: Vec<String>,
}

impl SecretMap {
    /// Returns all pointers in declaration order (secrets, then extras).
    #[must_use]
    pub fn pointers(&self) -> Vec<&str> {
        self.secrets
            .iter()
            .chain(self.redaction_extras.iter())
            .map(String::as_str)
            .collect()
    }

    /// Returns true when the map declares no pointers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty() && self.redaction_extras.is_empty()
    }
}

// ============================================================================
// SECTION: Denylist Matching
// ============================================================================

/// Returns true when a field name matches the denylist.
///
/// Matching is case-insensitive, treats `-` as `_`, and expands each entry
/// to `entry`, `entry_*`, and `*_entry` forms (e.g. `db_password`,
/// `password_hash`, `api_key`).
#[must_use]
pub fn is_denylisted_key(key: &str) -> bool {
    let normalized = key.to_ascii_lowercase().replace('-', "_");
    FIELD_DENYLIST.iter().any(|entry| {
        normalized == *entry
            || normalized.starts_with(&format!("{entry}_"))
            || normalized.ends_with(&format!("_{entry}"))
    })
}

// ============================================================================
// SECTION: Masking
// ============================================================================

/// Masks the values at each JSON Pointer in place.
///
/// Pointers that do not resolve are ignored; a component may declare
/// secrets for optional config fields.
pub fn redact_pointers(value: &mut Value, pointers: &[&str]) {
    for pointer in pointers {
        if let Some(target) = value.pointer_mut(pointer) {
            *target = Value::String(MASK.to_string());
        }
    }
}

/// Masks every value held under a denylisted key, recursively.
///
/// Object and array subtrees under a denylisted key collapse to the mask
/// marker, so nested credential blocks cannot leak through partial masking.
pub fn redact_denylist(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_denylisted_key(key) {
                    *entry = Value::String(MASK.to_string());
                } else {
                    redact_denylist(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_denylist(item);
            }
        }
        _ => {}
    }
}

/// Masks `${VAR}` environment placeholders inside string values, in place.
pub fn mask_placeholders(value: &mut Value) {
    match value {
        Value::String(text) => {
            if let Some(masked) = mask_placeholder_text(text) {
                *text = masked;
            }
        }
        Value::Object(map) => {
            for entry in map.values_mut() {
                mask_placeholders(entry);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                mask_placeholders(item);
            }
        }
        _ => {}
    }
}

/// Replaces each `${...}` span in `text` with the mask marker.
///
/// Returns `None` when the text contains no placeholder.
#[must_use]
pub fn mask_placeholder_text(text: &str) -> Option<String> {
    if !text.contains("${") {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut changed = false;
    while let Some(start) = rest.find("${") {
        let (head, tail) = rest.split_at(start);
        out.push_str(head);
        if let Some(end) = tail.find('}') {
            out.push_str(MASK);
            rest = tail.get(end + 1..).unwrap_or("");
            changed = true;
        } else {
            out.push_str(tail);
            rest = "";
        }
    }
    out.push_str(rest);
    changed.then_some(out)
}

/// Applies the full redaction stack to a payload value, in place.
///
/// Order: component pointers, then denylist, then placeholder masking.
pub fn redact_payload(value: &mut Value, secret_map: &SecretMap) {
    redact_pointers(value, &secret_map.pointers());
    redact_denylist(value);
    mask_placeholders(value);
}

// ============================================================================
// SECTION: Leak Scanning
// ============================================================================

/// Kind of a detected leak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakKind {
    /// A denylisted field holds an unmasked value.
    DenylistedValue,
    /// A string still contains a raw `${VAR}` placeholder.
    Placeholder,
}

/// One finding reported by the leak scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakFinding {
    /// JSON Pointer to the offending value.
    pub pointer: String,
    /// Finding classification.
    pub kind: LeakKind,
}

/// Scans a finished document for unmasked secrets and raw placeholders.
#[must_use]
pub fn scan_for_leaks(value: &Value) -> Vec<LeakFinding> {
    let mut findings = Vec::new();
    scan_node(value, &mut String::new(), false, &mut findings);
    findings
}

/// Recursive scan helper carrying the current JSON Pointer.
fn scan_node(value: &Value, pointer: &mut String, under_denylist: bool, out: &mut Vec<LeakFinding>) {
    match value {
        Value::String(text) => {
            if under_denylist && text != MASK && !text.is_empty() {
                out.push(LeakFinding {
                    pointer: pointer.clone(),
                    kind: LeakKind::DenylistedValue,
                });
            }
            if text.contains("${") && text.contains('}') {
                out.push(LeakFinding {
                    pointer: pointer.clone(),
                    kind: LeakKind::Placeholder,
                });
            }
        }
        Value::Object(map) => {
            for (key, entry) in map {
                let denylisted = under_denylist || is_denylisted_key(key);
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&escape_pointer_token(key));
                scan_node(entry, pointer, denylisted, out);
                pointer.truncate(len);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let len = pointer.len();
                pointer.push('/');
                pointer.push_str(&index.to_string());
                scan_node(item, pointer, under_denylist, out);
                pointer.truncate(len);
            }
        }
        Value::Number(_) | Value::Bool(_) => {
            if under_denylist {
                out.push(LeakFinding {
                    pointer: pointer.clone(),
                    kind: LeakKind::DenylistedValue,
                });
            }
        }
        Value::Null => {}
    }
}

/// Escapes a key for inclusion in a JSON Pointer (RFC 6901).
fn escape_pointer_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
