// crates/osiris-aiop/src/sign/tests.rs
// ============================================================================
// Module: Signing Tests
// Description: Unit tests for detached core signatures.
// Purpose: Validate key loading shapes and verifiable signatures.
// Dependencies: osiris-aiop, ed25519-dalek, tempfile
// ============================================================================

//! ## Overview
//! Signs fixture bytes with raw and hex key files and verifies the
//! detached signature with the corresponding public key.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use ed25519_dalek::Signature;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier;

use super::SignError;
use super::sign_core;

/// Deterministic 32-byte test key material.
const KEY_BYTES: [u8; 32] = [7_u8; 32];

// ============================================================================
// SECTION: Signing
// ============================================================================

#[test]
fn raw_key_produces_verifiable_signature() {
    let dir = tempfile::tempdir().expect("tempdir");
    let key_path = dir.path().join("aiop.key");
    fs::write(&key_path, KEY_BYTES).expect("key");
    let core_path = dir.path().join("core.json");
    let core_bytes = b"{\"control\":{}}\n";
    fs::write(&core_path, core_bytes).expect("core");

    sign_core(&key_path, &core_path, core_bytes).expect("sign");

    let rendered = fs::read_to_string(dir.path().join("core.json.sig")).expect("sig");
    let raw: Vec<u8> = (0..rendered.trim().len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&rendered.trim()[index..index + 2], 16).expect("hex"))
        .collect();
    let signature = Signature::from_slice(&raw).expect("signature");
    let key = SigningKey::from_bytes(&KEY_BYTES);
    key.verifying_key().verify(core_bytes, &signature).expect("verify");
}

#[test]
fn hex_key_is_accepted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let key_path = dir.path().join("aiop.key");
    let hex: String = KEY_BYTES.iter().map(|byte| format!("{byte:02x}")).collect();
    fs::write(&key_path, format!("{hex}\n")).expect("key");
    let core_path = dir.path().join("core.json");
    fs::write(&core_path, b"{}").expect("core");
    sign_core(&key_path, &core_path, b"{}").expect("sign");
    assert!(dir.path().join("core.json.sig").exists());
}

#[test]
fn malformed_key_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let key_path = dir.path().join("aiop.key");
    fs::write(&key_path, b"short").expect("key");
    let core_path = dir.path().join("core.json");
    let err = sign_core(&key_path, &core_path, b"{}").expect_err("expected shape error");
    assert!(matches!(err, SignError::KeyShape));
}
