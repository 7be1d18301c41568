// crates/osiris-aiop/src/retention.rs
// ============================================================================
// Module: Retention Engine
// Description: Age and keep-count policies for run logs and AIOP files.
// Purpose: Plan and apply deletions without ever touching build artifacts.
// Dependencies: osiris-config, osiris-core
// ============================================================================

//! ## Overview
//! Retention works in two phases: `plan` scans the contract-resolved
//! directories and returns the actions a policy implies; `apply` executes
//! a plan and reports what happened. Three policies exist: run-log
//! directories older than `run_logs_days` (age read from the directory
//! name's `run_ts` prefix), AIOP core files beyond
//! `aiop_keep_runs_per_pipeline` (newest kept, ranked by run id), and
//! annex shards older than `annex_keep_days` (file mtime). Nothing under
//! `build/` is ever deleted, and symlinks are skipped rather than
//! followed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use osiris_config::FilesystemContract;
use osiris_core::time::parse_iso_basic;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds in one day.
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by retention scanning.
#[derive(Debug, Error)]
pub enum RetentionError {
    /// Directory scan failed.
    #[error("retention scan failed for {path}: {message}")]
    Scan {
        /// Path that failed.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },
}

// ============================================================================
// SECTION: Plan Types
// ============================================================================

/// One planned deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Delete a directory tree.
    DeleteDir {
        /// Absolute directory path.
        path: PathBuf,
    },
    /// Delete a single file.
    DeleteFile {
        /// Absolute file path.
        path: PathBuf,
    },
}

impl Action {
    /// Returns the path the action targets.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::DeleteDir {
                path,
            }
            | Self::DeleteFile {
                path,
            } => path,
        }
    }
}

/// A retention plan grouped by policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionPlan {
    /// Run-log directories past their age limit.
    pub run_logs: Vec<Action>,
    /// AIOP core files beyond the per-pipeline keep count.
    pub aiop_cores: Vec<Action>,
    /// Annex shards past their age limit.
    pub annex_shards: Vec<Action>,
}

impl RetentionPlan {
    /// Returns true when the plan contains no actions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.run_logs.is_empty() && self.aiop_cores.is_empty() && self.annex_shards.is_empty()
    }

    /// Iterates every action in the plan.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.run_logs.iter().chain(self.aiop_cores.iter()).chain(self.annex_shards.iter())
    }
}

/// Outcome of applying a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Directories deleted.
    pub deleted_dirs: usize,
    /// Files deleted.
    pub deleted_files: usize,
    /// Deletions that failed, with messages.
    pub errors: Vec<String>,
}

// ============================================================================
// SECTION: Retention Engine
// ============================================================================

/// Applies retention policies under one filesystem contract.
pub struct RetentionEngine<'a> {
    /// Path resolution authority.
    contract: &'a FilesystemContract,
}

impl<'a> RetentionEngine<'a> {
    /// Creates a retention engine over a contract.
    #[must_use]
    pub const fn new(contract: &'a FilesystemContract) -> Self {
        Self {
            contract,
        }
    }

    /// Plans deletions as of `now_ms` without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`RetentionError`] when a directory scan fails; missing
    /// directories plan nothing.
    pub fn plan(&self, now_ms: i64) -> Result<RetentionPlan, RetentionError> {
        let retention = &self.contract.config().filesystem.retention;
        let mut plan = RetentionPlan::default();
        self.plan_run_logs(now_ms, i64::from(retention.run_logs_days), &mut plan)?;
        self.plan_aiop_cores(u64::from(retention.aiop_keep_runs_per_pipeline), &mut plan)?;
        self.plan_annex(now_ms, i64::from(retention.annex_keep_days), &mut plan)?;
        Ok(plan)
    }

    /// Applies a plan, deleting what it names.
    #[must_use]
    pub fn apply(&self, plan: &RetentionPlan) -> RetentionReport {
        let mut report = RetentionReport::default();
        for action in plan.actions() {
            // Path discipline: only ever delete inside the contract root.
            if !self.contract.contains(action.path()) {
                report
                    .errors
                    .push(format!("refused out-of-contract path {}", action.path().display()));
                continue;
            }
            match action {
                Action::DeleteDir {
                    path,
                } => match fs::remove_dir_all(path) {
                    Ok(()) => report.deleted_dirs += 1,
                    Err(err) => report.errors.push(format!("{}: {err}", path.display())),
                },
                Action::DeleteFile {
                    path,
                } => match fs::remove_file(path) {
                    Ok(()) => report.deleted_files += 1,
                    Err(err) => report.errors.push(format!("{}: {err}", path.display())),
                },
            }
        }
        report
    }

    /// Plans run-log directory deletions by `run_ts` age.
    fn plan_run_logs(
        &self,
        now_ms: i64,
        max_age_days: i64,
        plan: &mut RetentionPlan,
    ) -> Result<(), RetentionError> {
        let root = self
            .contract
            .base_path()
            .join(&self.contract.config().filesystem.run_logs_dir);
        for run_dir in walk_depth(&root, 2)? {
            let Some(name) = run_dir.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(ts_text) = name.split('_').next() else {
                continue;
            };
            let Ok(ts_ms) = parse_iso_basic(ts_text) else {
                continue;
            };
            if now_ms - ts_ms > max_age_days * DAY_MS {
                plan.run_logs.push(Action::DeleteDir {
                    path: run_dir,
                });
            }
        }
        Ok(())
    }

    /// Plans AIOP core deletions beyond the per-pipeline keep count.
    fn plan_aiop_cores(
        &self,
        keep_runs: u64,
        plan: &mut RetentionPlan,
    ) -> Result<(), RetentionError> {
        let root =
            self.contract.base_path().join(&self.contract.config().filesystem.aiop_dir);
        for pipeline_dir in walk_depth(&root, 1)? {
            // Collect (run_id, core path) pairs across manifest dirs.
            let mut cores: Vec<(u64, PathBuf)> = Vec::new();
            for manifest_dir in list_dirs(&pipeline_dir)? {
                for run_dir in list_dirs(&manifest_dir)? {
                    let Some(run_id) = run_dir
                        .file_name()
                        .and_then(|name| name.to_str())
                        .and_then(|name| name.parse::<u64>().ok())
                    else {
                        continue;
                    };
                    let core = run_dir.join("core.json");
                    if core.is_file() {
                        cores.push((run_id, core));
                    }
                }
            }
            cores.sort_by(|left, right| right.0.cmp(&left.0));
            for (_, core) in cores.into_iter().skip(usize::try_from(keep_runs).unwrap_or(0)) {
                plan.aiop_cores.push(Action::DeleteFile {
                    path: core,
                });
            }
        }
        Ok(())
    }

    /// Plans annex shard deletions by file mtime age.
    fn plan_annex(
        &self,
        now_ms: i64,
        max_age_days: i64,
        plan: &mut RetentionPlan,
    ) -> Result<(), RetentionError> {
        let root =
            self.contract.base_path().join(&self.contract.config().filesystem.aiop_dir);
        let annex_name = &self.contract.config().aiop.annex.dir;
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            for entry in list_entries(&dir)? {
                if is_symlink(&entry) {
                    continue;
                }
                if entry.is_dir() {
                    if entry.file_name().and_then(|name| name.to_str())
                        == Some(annex_name.as_str())
                    {
                        for shard in list_entries(&entry)? {
                            if shard.is_file() && file_age_ms(&shard, now_ms) > max_age_days * DAY_MS
                            {
                                plan.annex_shards.push(Action::DeleteFile {
                                    path: shard,
                                });
                            }
                        }
                    } else {
                        stack.push(entry);
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Walk Helpers
// ============================================================================

/// Lists entries of a directory; a missing directory yields none.
fn list_entries(dir: &Path) -> Result<Vec<PathBuf>, RetentionError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|err| RetentionError::Scan {
        path: dir.to_path_buf(),
        message: err.to_string(),
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| RetentionError::Scan {
            path: dir.to_path_buf(),
            message: err.to_string(),
        })?;
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}

/// Lists subdirectories of a directory (symlinks skipped).
fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>, RetentionError> {
    Ok(list_entries(dir)?
        .into_iter()
        .filter(|entry| entry.is_dir() && !is_symlink(entry))
        .collect())
}

/// Returns directories exactly `depth` levels below `root`.
fn walk_depth(root: &Path, depth: usize) -> Result<Vec<PathBuf>, RetentionError> {
    let mut current = vec![root.to_path_buf()];
    for _ in 0..=depth {
        let mut next = Vec::new();
        for dir in &current {
            next.extend(list_dirs(dir)?);
        }
        current = next;
    }
    Ok(current)
}

/// Returns true when a path is a symlink.
fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).map(|meta| meta.file_type().is_symlink()).unwrap_or(false)
}

/// Returns a file's age in milliseconds relative to `now_ms`.
fn file_age_ms(path: &Path, now_ms: i64) -> i64 {
    let modified_ms = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .and_then(|elapsed| i64::try_from(elapsed.as_millis()).ok())
        .unwrap_or_else(|| {
            i64::try_from(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis(),
            )
            .unwrap_or(0)
        });
    now_ms - modified_ms
}

// ============================================================================
// SECTION: Tests
// ============================================================================
