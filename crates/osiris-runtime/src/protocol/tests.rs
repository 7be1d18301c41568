// crates/osiris-runtime/src/protocol/tests.rs
// ============================================================================
// Module: Protocol Tests
// Description: Unit tests for the proxy wire protocol shapes.
// Purpose: Validate tags, round trips, and unknown-type tolerance.
// Dependencies: osiris-runtime
// ============================================================================

//! ## Overview
//! Validates the `cmd`/`type` tagged encodings, that unknown message types
//! decode to `Unknown` instead of failing, and that extra fields pass
//! through without errors.

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

use serde_json::json;

use super::HostCommand;
use super::WorkerMessage;

// ============================================================================
// SECTION: Command Encoding
// ============================================================================

#[test]
fn commands_encode_with_cmd_tag() {
    let line = HostCommand::Cleanup.encode().expect("encode");
    assert_eq!(line, "{\"cmd\":\"cleanup\"}");

    let line = HostCommand::Cancel {
        step_id: Some("extract".to_string()),
    }
    .encode()
    .expect("encode");
    let parsed: serde_json::Value = serde_json::from_str(&line).expect("parse");
    assert_eq!(parsed["cmd"], json!("cancel"));
    assert_eq!(parsed["step_id"], json!("extract"));
}

#[test]
fn exec_step_round_trips() {
    let command = HostCommand::ExecStep {
        step_id: "extract".to_string(),
        driver: "inline.extractor".to_string(),
        config: json!({"rows": []}),
        inputs: json!({}),
    };
    let line = command.encode().expect("encode");
    let decoded: HostCommand = serde_json::from_str(&line).expect("decode");
    assert_eq!(decoded, command);
}

// ============================================================================
// SECTION: Message Decoding
// ============================================================================

#[test]
fn messages_decode_with_type_tag() {
    let decoded: WorkerMessage =
        serde_json::from_str("{\"type\":\"ready\",\"session_id\":\"s\"}").expect("decode");
    assert_eq!(decoded, WorkerMessage::Ready {
        session_id: "s".to_string(),
    });
}

#[test]
fn unknown_message_types_decode_to_unknown() {
    let decoded: WorkerMessage =
        serde_json::from_str("{\"type\":\"heartbeat\",\"n\":1}").expect("decode");
    assert_eq!(decoded, WorkerMessage::Unknown);
}

#[test]
fn step_complete_round_trips() {
    let message = WorkerMessage::StepComplete {
        step_id: "extract".to_string(),
        rows: 1204,
        duration_ms: 850,
    };
    let line = message.encode().expect("encode");
    let decoded: WorkerMessage = serde_json::from_str(&line).expect("decode");
    assert_eq!(decoded, message);
}
