// crates/osiris-index/src/index.rs
// ============================================================================
// Module: Run Index
// Description: Append-only NDJSON record of run outcomes with shards.
// Purpose: Durable run history, fast lookup, and delta-source scanning.
// Dependencies: osiris-config, osiris-core, serde_json
// ============================================================================

//! ## Overview
//! Every completed run appends exactly one JSON line to the global
//! `runs.jsonl` and to its pipeline's `by_pipeline/<slug>.jsonl` shard.
//! Appends open the files with `O_APPEND`, encode the record as one
//! canonical line capped at 4 KiB, issue a single write, and fsync before
//! returning, so concurrent writers never interleave or lose records. The
//! index never rewrites or truncates; readers stream and tolerate foreign
//! malformed lines. Shard paths always come from the active filesystem
//! contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use osiris_config::ConfigError;
use osiris_config::IndexPaths;
use osiris_config::PointerFile;
use osiris_config::contract::ensure_dir;
use osiris_core::hashing::canonical_json_bytes;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum encoded record line size (keeps appends single atomic writes).
pub const MAX_RECORD_LINE_BYTES: usize = 4096;

/// Status labels treated as successful for delta lookup.
const COMPLETED_STATUSES: &[&str] = &["completed", "success"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by run index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// File I/O failed.
    #[error("index i/o failed for {path}: {message}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },
    /// Record encoding failed.
    #[error("record encoding failed: {0}")]
    Encode(String),
    /// Encoded record exceeds the single-write cap.
    #[error("record line too large: {size} bytes (max {MAX_RECORD_LINE_BYTES})")]
    RecordTooLarge {
        /// Encoded line size.
        size: usize,
    },
    /// Pointer file read failed.
    #[error(transparent)]
    Pointer(#[from] ConfigError),
}

// ============================================================================
// SECTION: Run Record
// ============================================================================

/// One run outcome as recorded in the index.
///
/// # Invariants
/// - Encodes to a single JSON line with the required key set
///   `{run_id, session_id, pipeline_slug, profile, manifest_hash,
///   started_at, ended_at, status}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Monotonic run id for the pipeline and profile.
    pub run_id: u64,
    /// Globally unique session id.
    pub session_id: String,
    /// Pipeline slug.
    pub pipeline_slug: String,
    /// Profile label.
    pub profile: String,
    /// Manifest hash executed by this run.
    pub manifest_hash: String,
    /// Manifest short prefix.
    pub manifest_short: String,
    /// Terminal status label.
    pub status: String,
    /// RFC3339 start timestamp.
    pub started_at: String,
    /// RFC3339 end timestamp.
    pub ended_at: String,
    /// Total rows moved.
    pub rows: u64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Absolute run-log directory path.
    pub run_logs_path: String,
    /// Absolute AIOP core path, when exported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aiop_path: Option<String>,
}

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Filter applied by `runs list`.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    /// Restrict to one pipeline slug.
    pub pipeline: Option<String>,
    /// Restrict to one status label.
    pub status: Option<String>,
    /// Maximum records returned (newest last); unlimited when `None`.
    pub limit: Option<usize>,
}

impl RunFilter {
    /// Returns true when a record passes the filter.
    fn matches(&self, record: &RunRecord) -> bool {
        self.pipeline.as_ref().is_none_or(|slug| &record.pipeline_slug == slug)
            && self.status.as_ref().is_none_or(|status| &record.status == status)
    }
}

// ============================================================================
// SECTION: Run Index
// ============================================================================

/// Append-only run index rooted at the contract's index paths.
#[derive(Debug, Clone)]
pub struct RunIndex {
    /// Resolved index paths.
    paths: IndexPaths,
}

impl RunIndex {
    /// Creates an index over resolved paths.
    #[must_use]
    pub const fn new(paths: IndexPaths) -> Self {
        Self {
            paths,
        }
    }

    /// Returns the resolved index paths.
    #[must_use]
    pub const fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// Appends one record to the global file and the pipeline shard.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when encoding or either append fails.
    pub fn append(&self, record: &RunRecord) -> Result<(), IndexError> {
        let mut line = canonical_json_bytes(record)
            .map_err(|err| IndexError::Encode(err.to_string()))?;
        line.push(b'\n');
        if line.len() > MAX_RECORD_LINE_BYTES {
            return Err(IndexError::RecordTooLarge {
                size: line.len(),
            });
        }
        append_line(&self.paths.runs_jsonl, &line)?;
        ensure_dir(&self.paths.by_pipeline_dir).map_err(|err| IndexError::Io {
            path: self.paths.by_pipeline_dir.clone(),
            message: err.to_string(),
        })?;
        let shard = self.paths.by_pipeline_dir.join(format!("{}.jsonl", record.pipeline_slug));
        append_line(&shard, &line)
    }

    /// Reads the latest pointer for a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Pointer`] when the pointer is missing or
    /// malformed.
    pub fn latest(&self, pipeline_slug: &str) -> Result<PointerFile, IndexError> {
        Ok(PointerFile::read(&self.paths.latest_dir.join(format!("{pipeline_slug}.txt")))?)
    }

    /// Reads the last-compile pointer.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Pointer`] when the pointer is missing or
    /// malformed.
    pub fn last_compile(&self) -> Result<PointerFile, IndexError> {
        Ok(PointerFile::read(&self.paths.last_compile)?)
    }

    /// Streams records from `runs.jsonl` matching the filter.
    ///
    /// Malformed lines written by older tooling are skipped rather than
    /// failing the listing.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] when the file cannot be opened (a
    /// missing file yields an empty listing).
    pub fn list(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, IndexError> {
        let mut records = read_records(&self.paths.runs_jsonl)?;
        records.retain(|record| filter.matches(record));
        if let Some(limit) = filter.limit {
            let drop = records.len().saturating_sub(limit);
            records.drain(..drop);
        }
        Ok(records)
    }

    /// Finds a run by run id or session id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] when the index cannot be read.
    pub fn find(&self, needle: &str) -> Result<Option<RunRecord>, IndexError> {
        let records = read_records(&self.paths.runs_jsonl)?;
        Ok(records
            .into_iter()
            .rev()
            .find(|record| record.session_id == needle || record.run_id.to_string() == needle))
    }

    /// Returns the most recent completed run of a manifest, excluding the
    /// current session.
    ///
    /// Scans the pipeline shard resolved from the active contract; records
    /// keep when `status` is completed (or the legacy `success` label) and
    /// the session differs. The winner has the greatest `started_at`,
    /// falling back to `ended_at` on ties.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] when the shard cannot be read.
    pub fn find_previous_completed(
        &self,
        pipeline_slug: &str,
        manifest_hash: &str,
        exclude_session_id: &str,
    ) -> Result<Option<RunRecord>, IndexError> {
        let shard = self.paths.by_pipeline_dir.join(format!("{pipeline_slug}.jsonl"));
        let records = read_records(&shard)?;
        Ok(records
            .into_iter()
            .filter(|record| {
                COMPLETED_STATUSES.contains(&record.status.as_str())
                    && record.manifest_hash == manifest_hash
                    && record.session_id != exclude_session_id
            })
            .max_by(|left, right| {
                left.started_at
                    .cmp(&right.started_at)
                    .then_with(|| left.ended_at.cmp(&right.ended_at))
            }))
    }
}

// ============================================================================
// SECTION: File Helpers
// ============================================================================

/// Appends one encoded line with a single write and fsync.
fn append_line(path: &Path, line: &[u8]) -> Result<(), IndexError> {
    let io_err = |message: String| IndexError::Io {
        path: path.to_path_buf(),
        message,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_err(err.to_string()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| io_err(err.to_string()))?;
    file.write_all(line).map_err(|err| io_err(err.to_string()))?;
    file.sync_all().map_err(|err| io_err(err.to_string()))
}

/// Reads every parseable record from an NDJSON file.
fn read_records(path: &Path) -> Result<Vec<RunRecord>, IndexError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).map_err(|err| IndexError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|err| IndexError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<RunRecord>(&line) {
            records.push(record);
        }
    }
    Ok(records)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
