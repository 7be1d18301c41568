// crates/osiris-index/src/allocator.rs
// ============================================================================
// Module: Run-ID Allocator
// Description: Monotonic per-pipeline run ids from a SQLite counter store.
// Purpose: Allocate strictly increasing ids under concurrent writers.
// Dependencies: osiris-core, rand, rusqlite
// ============================================================================

//! ## Overview
//! The counter store is a WAL-mode SQLite database holding one row per
//! `(pipeline_slug, profile)` pair. Each allocation runs an exclusive
//! `BEGIN IMMEDIATE` transaction: insert-or-ignore the row, then
//! `UPDATE ... RETURNING` the incremented value. `SQLITE_BUSY` and
//! `SQLITE_LOCKED` retry with bounded exponential backoff (base 10 ms,
//! cap 1 s, 10 attempts). Gaps are permitted after crash recovery;
//! monotonicity is absolute.
//!
//! The module also provides the process-monotonic ULID generator used for
//! session identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use osiris_core::ManifestShort;
use osiris_core::RunId;
use osiris_core::SessionId;
use osiris_core::time::utc_now_ms;
use rand::RngCore;
use rand::rngs::OsRng;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Counter store schema version.
const SCHEMA_VERSION: i64 = 1;
/// Base backoff delay for contended allocations (milliseconds).
const BACKOFF_BASE_MS: u64 = 10;
/// Backoff cap (milliseconds).
const BACKOFF_CAP_MS: u64 = 1_000;
/// Maximum allocation attempts before giving up.
const MAX_ATTEMPTS: u32 = 10;
/// Busy timeout applied to the SQLite connection (milliseconds).
const BUSY_TIMEOUT_MS: u64 = 5_000;
/// Crockford base32 alphabet used by ULID encoding.
const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the allocator.
///
/// # Invariants
/// - Variants are stable for programmatic handling; both map to the
///   STORAGE error family.
#[derive(Debug, Error)]
pub enum AllocatorError {
    /// Retries exhausted under contention.
    #[error("run-id allocation contended after {attempts} attempts")]
    Contention {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Unrecoverable SQLite failure.
    #[error("counter store failure: {0}")]
    Storage(String),
}

// ============================================================================
// SECTION: Allocator
// ============================================================================

/// Monotonic run-id allocator backed by `counters.sqlite`.
pub struct RunIdAllocator {
    /// Exclusive connection to the counter store.
    conn: Mutex<Connection>,
    /// ULID generator for session identifiers.
    ulids: UlidGenerator,
}

impl RunIdAllocator {
    /// Opens (and initializes) the counter store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::Storage`] when the database cannot be
    /// opened or migrated.
    pub fn open(path: &Path) -> Result<Self, AllocatorError> {
        let conn = Connection::open(path)
            .map_err(|err| AllocatorError::Storage(err.to_string()))?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|err| AllocatorError::Storage(err.to_string()))?;
        conn.pragma_update(None, "journal_mode", "wal")
            .map_err(|err| AllocatorError::Storage(err.to_string()))?;
        conn.pragma_update(None, "synchronous", "full")
            .map_err(|err| AllocatorError::Storage(err.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_info (version INTEGER NOT NULL);
             CREATE TABLE IF NOT EXISTS run_counters (
                 pipeline_slug TEXT NOT NULL,
                 profile TEXT NOT NULL,
                 next_run_id INTEGER NOT NULL,
                 PRIMARY KEY (pipeline_slug, profile)
             );",
        )
        .map_err(|err| AllocatorError::Storage(err.to_string()))?;
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_info", [], |row| row.get(0))
            .map_err(|err| AllocatorError::Storage(err.to_string()))?;
        if versions == 0 {
            conn.execute("INSERT INTO schema_info (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| AllocatorError::Storage(err.to_string()))?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            ulids: UlidGenerator::new(),
        })
    }

    /// Allocates the next run id for a pipeline and profile.
    ///
    /// The first call for a pair returns 1; later calls return strictly
    /// greater values.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::Contention`] when retries are exhausted
    /// and [`AllocatorError::Storage`] on unrecoverable failures.
    pub fn next(&self, pipeline_slug: &str, profile: &str) -> Result<RunId, AllocatorError> {
        let mut delay_ms = BACKOFF_BASE_MS;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_increment(pipeline_slug, profile) {
                Ok(value) => {
                    return RunId::from_raw(value).ok_or_else(|| {
                        AllocatorError::Storage("counter returned zero".to_string())
                    });
                }
                Err(err) if is_contended(&err) && attempt < MAX_ATTEMPTS => {
                    thread::sleep(Duration::from_millis(delay_ms));
                    delay_ms = (delay_ms * 2).min(BACKOFF_CAP_MS);
                }
                Err(err) if is_contended(&err) => {
                    return Err(AllocatorError::Contention {
                        attempts: MAX_ATTEMPTS,
                    });
                }
                Err(err) => return Err(AllocatorError::Storage(err.to_string())),
            }
        }
        Err(AllocatorError::Contention {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Runs one exclusive increment transaction.
    fn try_increment(&self, pipeline_slug: &str, profile: &str) -> Result<u64, rusqlite::Error> {
        let mut guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT OR IGNORE INTO run_counters (pipeline_slug, profile, next_run_id)
             VALUES (?1, ?2, 0)",
            params![pipeline_slug, profile],
        )?;
        let value: i64 = tx.query_row(
            "UPDATE run_counters SET next_run_id = next_run_id + 1
             WHERE pipeline_slug = ?1 AND profile = ?2
             RETURNING next_run_id",
            params![pipeline_slug, profile],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(value.unsigned_abs())
    }

    /// Returns a new process-monotonic ULID.
    #[must_use]
    pub fn ulid(&self) -> String {
        self.ulids.next()
    }

    /// Composes a session identifier for a freshly allocated run.
    #[must_use]
    pub fn session_id(&self, run_id: RunId, short: &ManifestShort) -> SessionId {
        SessionId::compose(run_id, &self.ulid(), short)
    }
}

/// Returns true when an error is a retryable busy/locked condition.
fn is_contended(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::DatabaseBusy
                || failure.code == ErrorCode::DatabaseLocked
    )
}

// ============================================================================
// SECTION: ULID Generator
// ============================================================================

/// Process-monotonic ULID generator.
///
/// # Invariants
/// - Values are 26 Crockford base32 characters.
/// - Within one process, successive values sort strictly increasing.
#[derive(Debug, Default)]
pub struct UlidGenerator {
    /// Last issued (timestamp ms, 80-bit entropy) pair.
    state: Mutex<(i64, u128)>,
}

impl UlidGenerator {
    /// Creates a generator with empty state; entropy draws lazily.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next ULID.
    #[must_use]
    pub fn next(&self) -> String {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = utc_now_ms();
        let (last_ms, last_entropy) = *guard;
        let (ms, entropy) = if now > last_ms {
            (now, random_entropy())
        } else {
            // Same or rewound millisecond: bump entropy to stay monotonic.
            (last_ms, (last_entropy + 1) & ((1_u128 << 80) - 1))
        };
        *guard = (ms, entropy);
        encode_ulid(ms, entropy)
    }
}

/// Draws 80 bits of entropy from the OS random source.
fn random_entropy() -> u128 {
    let mut bytes = [0_u8; 10];
    OsRng.fill_bytes(&mut bytes);
    let mut value: u128 = 0;
    for byte in bytes {
        value = (value << 8) | u128::from(byte);
    }
    value
}

/// Encodes a 48-bit timestamp and 80-bit entropy as 26 Crockford chars.
fn encode_ulid(ms: i64, entropy: u128) -> String {
    let value = (u128::from(ms.unsigned_abs() & 0xFFFF_FFFF_FFFF) << 80) | entropy;
    let mut out = String::with_capacity(26);
    for index in (0..26).rev() {
        let shift = index * 5;
        let digit = usize::try_from((value >> shift) & 0x1F).unwrap_or(0);
        out.push(CROCKFORD[digit] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
