// crates/osiris-aiop/src/sign.rs
// ============================================================================
// Module: AIOP Signing
// Description: Optional detached ed25519 signatures for core files.
// Purpose: Let auditors verify package integrity offline.
// Dependencies: ed25519-dalek
// ============================================================================

//! ## Overview
//! When a signing key is configured, the exporter writes a detached
//! signature `core.json.sig` (hex-encoded) over the exact core bytes. The
//! key file holds 32 raw bytes or 64 hex characters and is read only by
//! the exporting CLI process; the MCP server never sees it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while signing a core file.
#[derive(Debug, Error)]
pub enum SignError {
    /// Key file could not be read.
    #[error("signing key unreadable: {0}")]
    KeyRead(String),
    /// Key material has the wrong shape.
    #[error("signing key must be 32 raw bytes or 64 hex characters")]
    KeyShape,
    /// Signature write failed.
    #[error("signature write failed: {0}")]
    Write(String),
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Signs `core_bytes` and writes `<core>.sig` next to the core file.
///
/// # Errors
///
/// Returns [`SignError`] when the key is unreadable, malformed, or the
/// signature cannot be written.
pub fn sign_core(key_path: &Path, core_path: &Path, core_bytes: &[u8]) -> Result<(), SignError> {
    let key = load_key(key_path)?;
    let signature = key.sign(core_bytes);
    let rendered = hex_encode(&signature.to_bytes());
    let sig_path = core_path.with_extension("json.sig");
    fs::write(&sig_path, format!("{rendered}\n")).map_err(|err| SignError::Write(err.to_string()))
}

/// Loads the signing key from raw or hex form.
fn load_key(path: &Path) -> Result<SigningKey, SignError> {
    let bytes = fs::read(path).map_err(|err| SignError::KeyRead(err.to_string()))?;
    if bytes.len() == 32 {
        let mut raw = [0_u8; 32];
        raw.copy_from_slice(&bytes);
        return Ok(SigningKey::from_bytes(&raw));
    }
    let text = String::from_utf8_lossy(&bytes);
    let trimmed = text.trim();
    if trimmed.len() == 64 && trimmed.chars().all(|ch| ch.is_ascii_hexdigit()) {
        let mut raw = [0_u8; 32];
        for (index, chunk) in trimmed.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| SignError::KeyShape)?;
            raw[index] = u8::from_str_radix(pair, 16).map_err(|_| SignError::KeyShape)?;
        }
        return Ok(SigningKey::from_bytes(&raw));
    }
    Err(SignError::KeyShape)
}

/// Encodes bytes as lowercase hex.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
