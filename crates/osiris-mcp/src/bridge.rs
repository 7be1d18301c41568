// crates/osiris-mcp/src/bridge.rs
// ============================================================================
// Module: CLI Bridge
// Description: Subprocess invocation boundary isolating secrets in the CLI.
// Purpose: Run `osiris … --json` subprocesses with timeouts and caps.
// Dependencies: rand, serde_json
// ============================================================================

//! ## Overview
//! The bridge is the only path from the MCP server to secret-bearing
//! operations. It spawns the `osiris` binary with the caller's arguments,
//! pipes optional stdin, collects stdout on a reader thread bounded by the
//! payload cap, polls the child against a deadline (killing it on
//! timeout), and maps exit codes to error families: 0 ok, 1 SCHEMA,
//! 2 CONNECTION, 3 SEMANTIC, 4 TIMEOUT, 5+ PLATFORM. Each call gets a
//! correlation id `mcp_<hex8>` propagated to telemetry. The subprocess
//! inherits the shell environment and resolves secrets itself; the bridge
//! only ever sees already-redacted JSON.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default per-tool payload cap (16 MiB).
pub const DEFAULT_PAYLOAD_CAP: usize = 16 * 1024 * 1024;
/// Poll interval while waiting for the subprocess.
const WAIT_POLL: Duration = Duration::from_millis(10);

// ============================================================================
// SECTION: Errors & Families
// ============================================================================

/// Error families reported by delegated CLI calls.
///
/// # Invariants
/// - Labels are stable for MCP error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeFamily {
    /// Exit code 1: schema validation failure.
    Schema,
    /// Exit code 2: connection failure.
    Connection,
    /// Exit code 3: semantic failure.
    Semantic,
    /// Exit code 4: timeout inside the CLI.
    Timeout,
    /// Exit code 5 and above: platform failure.
    Platform,
}

impl BridgeFamily {
    /// Maps a CLI exit code to a family (`None` for success).
    #[must_use]
    pub const fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::Schema),
            2 => Some(Self::Connection),
            3 => Some(Self::Semantic),
            4 => Some(Self::Timeout),
            _ => Some(Self::Platform),
        }
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Schema => "SCHEMA",
            Self::Connection => "CONNECTION",
            Self::Semantic => "SEMANTIC",
            Self::Timeout => "TIMEOUT",
            Self::Platform => "PLATFORM",
        }
    }
}

/// Errors raised by the bridge itself (not by delegated tools).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The CLI binary could not be spawned.
    #[error("cli spawn failed for {binary}: {message}")]
    Spawn {
        /// Binary that failed to start.
        binary: PathBuf,
        /// Underlying message.
        message: String,
    },
    /// The call exceeded its deadline and the subprocess was killed.
    #[error("cli call timed out after {seconds}s")]
    Timeout {
        /// Budget that elapsed.
        seconds: u64,
    },
    /// The response exceeded the payload cap.
    #[error("cli response exceeds payload cap of {cap} bytes")]
    PayloadTooLarge {
        /// Configured cap.
        cap: usize,
    },
    /// Subprocess I/O failed.
    #[error("cli i/o failed: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of one delegated CLI call.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeOutcome {
    /// True when the CLI exited 0.
    pub ok: bool,
    /// Parsed JSON payload from stdout, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error family for non-zero exits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BridgeFamily>,
    /// Raw CLI exit code.
    pub exit_code: i32,
    /// Call duration in milliseconds.
    pub duration_ms: u64,
    /// Correlation id `mcp_<hex8>` for this call.
    pub correlation_id: String,
}

// ============================================================================
// SECTION: Bridge
// ============================================================================

/// Subprocess invocation boundary for secret-touching operations.
pub struct CliBridge {
    /// `osiris` binary path.
    binary: PathBuf,
    /// Per-call timeout.
    timeout: Duration,
    /// Payload size cap in bytes.
    payload_cap: usize,
}

impl CliBridge {
    /// Creates a bridge for the given binary with default limits.
    #[must_use]
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            timeout: DEFAULT_TIMEOUT,
            payload_cap: DEFAULT_PAYLOAD_CAP,
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the payload cap.
    #[must_use]
    pub const fn with_payload_cap(mut self, cap: usize) -> Self {
        self.payload_cap = cap;
        self
    }

    /// Returns the configured payload cap.
    #[must_use]
    pub const fn payload_cap(&self) -> usize {
        self.payload_cap
    }

    /// Runs one `osiris … --json` subprocess to completion.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] for spawn failures, timeouts, oversize
    /// responses, and broken pipes. Non-zero exit codes are not errors at
    /// this layer; they surface through [`BridgeOutcome::error`].
    pub fn run_cli_json(
        &self,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<BridgeOutcome, BridgeError> {
        let correlation_id = correlation_id();
        let started = Instant::now();
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| BridgeError::Spawn {
                binary: self.binary.clone(),
                message: err.to_string(),
            })?;

        if let Some(payload) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(payload).map_err(|err| BridgeError::Io(err.to_string()))?;
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Io("cli stdout missing".to_string()))?;
        let cap = self.payload_cap;
        let collector = thread::spawn(move || read_capped(stdout, cap));

        let deadline = started + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(BridgeError::Timeout {
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    thread::sleep(WAIT_POLL);
                }
                Err(err) => return Err(BridgeError::Io(err.to_string())),
            }
        };
        let stdout_bytes = collector
            .join()
            .map_err(|_| BridgeError::Io("stdout reader panicked".to_string()))??;

        let exit_code = status.code().unwrap_or(-1);
        let data = serde_json::from_slice::<Value>(&stdout_bytes).ok();
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(BridgeOutcome {
            ok: exit_code == 0,
            data,
            error: BridgeFamily::from_exit_code(exit_code),
            exit_code,
            duration_ms,
            correlation_id,
        })
    }
}

/// Reads a stream up to the cap, failing on overflow.
fn read_capped(mut stream: impl Read, cap: usize) -> Result<Vec<u8>, BridgeError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 8192];
    loop {
        let read = stream.read(&mut chunk).map_err(|err| BridgeError::Io(err.to_string()))?;
        if read == 0 {
            return Ok(buffer);
        }
        if buffer.len() + read > cap {
            return Err(BridgeError::PayloadTooLarge {
                cap,
            });
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

/// Issues a fresh `mcp_<hex8>` correlation id.
#[must_use]
pub fn correlation_id() -> String {
    let mut bytes = [0_u8; 4];
    OsRng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("mcp_{hex}")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
