// crates/osiris-aiop/src/export.rs
// ============================================================================
// Module: AIOP Exporter
// Description: Deterministic, size-bounded audit package generation.
// Purpose: Collect session outputs into a secret-free JSON-LD envelope.
// Dependencies: osiris-compiler, osiris-config, osiris-core, osiris-index
// ============================================================================

//! ## Overview
//! Export runs in fixed phases: collect the session's streams and
//! artifacts, redact, assign `osiris://` identifiers and evidence ids,
//! build the four layers, compute the delta against the previous completed
//! run, canonicalize (sorted keys, chronological events, topological
//! steps, metrics grouped by step then name), truncate against
//! `max_core_bytes` with markers and annex overflow, scan the result for
//! leaks (failing closed), and finally write the core and run-card
//! atomically. Identical inputs produce identical bytes apart from the
//! whitelisted non-deterministic fields (`generated_at`, `session_id`,
//! timestamps, and values derived from them).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write as IoWrite;
use std::path::Path;
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;
use osiris_compiler::Manifest;
use osiris_config::AiopConfig;
use osiris_config::AiopPaths;
use osiris_config::AnnexCompression;
use osiris_config::DeltaMode;
use osiris_config::FilesystemContract;
use osiris_config::TimelineDensity;
use osiris_config::contract::ensure_dir;
use osiris_config::contract::replace_file;
use osiris_core::PipelineSlug;
use osiris_core::Profile;
use osiris_core::RunId;
use osiris_core::hashing::sha256_hex;
use osiris_core::redaction;
use osiris_core::redaction::LeakFinding;
use osiris_core::time::format_rfc3339_millis;
use osiris_core::time::parse_rfc3339_millis;
use osiris_core::time::utc_now_ms;
use osiris_index::RunIndex;
use osiris_index::RunRecord;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::leak;
use crate::narrative;
use crate::sign;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Crate version stamped into package metadata and fingerprints.
pub const OSIRIS_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised during AIOP export.
///
/// # Invariants
/// - `SecretLeak` aborts the export with partial files removed.
#[derive(Debug, Error)]
pub enum AiopError {
    /// Stream or package I/O failed.
    #[error("aiop i/o failed for {path}: {message}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },
    /// JSON encoding failed.
    #[error("aiop encoding failed: {0}")]
    Encode(String),
    /// The final leak scan found unredacted secrets.
    #[error("secret leak detected: {} finding(s)", findings.len())]
    SecretLeak {
        /// Scanner findings.
        findings: Vec<LeakFinding>,
    },
    /// Delta lookup failed.
    #[error("delta lookup failed: {0}")]
    Index(String),
    /// Signing failed.
    #[error("aiop signing failed: {0}")]
    Sign(String),
}

// ============================================================================
// SECTION: Input & Outcome
// ============================================================================

/// Everything the exporter needs for one completed run.
pub struct ExportInput<'a> {
    /// Path resolution authority.
    pub contract: &'a FilesystemContract,
    /// Run index used for delta lookup.
    pub index: &'a RunIndex,
    /// Compiled manifest the run executed.
    pub manifest: &'a Manifest,
    /// The run's index record (already appended).
    pub record: &'a RunRecord,
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Resolved AIOP paths.
    pub paths: AiopPaths,
    /// Final core size in bytes.
    pub core_bytes: usize,
    /// Whether the timeline or metrics were truncated.
    pub truncated: bool,
}

// ============================================================================
// SECTION: Exporter
// ============================================================================

/// Deterministic audit package exporter.
pub struct AiopExporter {
    /// Effective AIOP configuration.
    config: AiopConfig,
}

impl AiopExporter {
    /// Creates an exporter from configuration.
    #[must_use]
    pub const fn new(config: AiopConfig) -> Self {
        Self {
            config,
        }
    }

    /// Exports one run's audit package.
    ///
    /// # Errors
    ///
    /// Returns [`AiopError`]; on [`AiopError::SecretLeak`] partial files
    /// are removed before returning.
    pub fn export(&self, input: &ExportInput<'_>) -> Result<ExportOutcome, AiopError> {
        let slug = PipelineSlug::parse(&input.record.pipeline_slug)
            .map_err(|err| AiopError::Encode(err.to_string()))?;
        let profile = Profile::parse(&input.record.profile)
            .map_err(|err| AiopError::Encode(err.to_string()))?;
        let hash = input
            .manifest
            .hash()
            .map_err(|err| AiopError::Encode(err.to_string()))?;
        let short = hash
            .short(input.contract.manifest_short_len())
            .map_err(|err| AiopError::Encode(err.to_string()))?;
        let run_id = RunId::from_raw(input.record.run_id)
            .ok_or_else(|| AiopError::Encode("run id must be non-zero".to_string()))?;
        let paths = input
            .contract
            .aiop_paths(&slug, &profile, &short, &hash, run_id)
            .map_err(|err| AiopError::Encode(err.to_string()))?;
        ensure_dir(&paths.dir).map_err(|err| AiopError::Io {
            path: paths.dir.clone(),
            message: err.to_string(),
        })?;

        let run_dir = PathBuf::from(&input.record.run_logs_path);
        let events = read_jsonl(&run_dir.join("events.jsonl"))?;
        let metrics = read_jsonl(&run_dir.join("metrics.jsonl"))?;
        let artifacts = collect_artifacts(&run_dir.join("artifacts"))?;

        let delta = self.compute_delta(input)?;
        let mut builder = CoreBuilder {
            config: &self.config,
            input,
            events,
            metrics,
            artifacts,
            delta,
        };
        let (core, truncation) = builder.build(&paths)?;

        let findings = leak::scan_core(&core);
        if !findings.is_empty() {
            let _ = fs::remove_dir_all(&paths.dir);
            return Err(AiopError::SecretLeak {
                findings,
            });
        }

        let mut bytes = serde_json::to_vec_pretty(&core)
            .map_err(|err| AiopError::Encode(err.to_string()))?;
        bytes.push(b'\n');
        replace_file(&paths.core, &bytes).map_err(|err| AiopError::Io {
            path: paths.core.clone(),
            message: err.to_string(),
        })?;
        if self.config.run_card {
            let card = narrative::render_run_card(&core);
            replace_file(&paths.run_card, card.as_bytes()).map_err(|err| AiopError::Io {
                path: paths.run_card.clone(),
                message: err.to_string(),
            })?;
        }
        if let Some(key_path) = &self.config.signing.key_path {
            sign::sign_core(Path::new(key_path), &paths.core, &bytes)
                .map_err(|err| AiopError::Sign(err.to_string()))?;
        }
        Ok(ExportOutcome {
            core_bytes: bytes.len(),
            truncated: truncation,
            paths,
        })
    }

    /// Computes the delta object against the previous completed run.
    fn compute_delta(&self, input: &ExportInput<'_>) -> Result<Value, AiopError> {
        if self.config.delta == DeltaMode::None {
            return Ok(Value::Null);
        }
        let previous = input
            .index
            .find_previous_completed(
                &input.record.pipeline_slug,
                &input.record.manifest_hash,
                &input.record.session_id,
            )
            .map_err(|err| AiopError::Index(err.to_string()))?;
        let Some(previous) = previous else {
            return Ok(json!({
                "first_run": true,
                "delta_source": "by_pipeline_index",
            }));
        };
        Ok(json!({
            "first_run": false,
            "delta_source": "by_pipeline_index",
            "previous_session_id": previous.session_id,
            "rows": {
                "previous": previous.rows,
                "current": input.record.rows,
                "change_percent": percent_change(previous.rows, input.record.rows),
            },
            "duration": {
                "previous": previous.duration_ms,
                "current": input.record.duration_ms,
                "change_percent": percent_change(previous.duration_ms, input.record.duration_ms),
            },
        }))
    }
}

/// Percentage change between two counters, `null` when undefined.
fn percent_change(previous: u64, current: u64) -> Value {
    if previous == 0 {
        return Value::Null;
    }
    let previous_f = previous as f64;
    let current_f = current as f64;
    let percent = ((current_f - previous_f) / previous_f) * 100.0;
    json!((percent * 100.0).round() / 100.0)
}

// ============================================================================
// SECTION: Core Assembly
// ============================================================================

/// Working state for one core document build.
struct CoreBuilder<'a> {
    /// Effective configuration.
    config: &'a AiopConfig,
    /// Export input.
    input: &'a ExportInput<'a>,
    /// Collected timeline events.
    events: Vec<Value>,
    /// Collected metrics.
    metrics: Vec<Value>,
    /// Collected artifact references.
    artifacts: Vec<Value>,
    /// Computed delta object.
    delta: Value,
}

impl CoreBuilder<'_> {
    /// Builds the canonical core document, truncating to the size bound.
    fn build(&mut self, paths: &AiopPaths) -> Result<(Value, bool), AiopError> {
        for event in &mut self.events {
            redaction::redact_denylist(event);
            redaction::mask_placeholders(event);
        }
        for metric in &mut self.metrics {
            redaction::redact_denylist(metric);
            redaction::mask_placeholders(metric);
        }

        let mut kept_events = density_filter(&self.events, self.config.timeline_density);
        let (mut kept_metrics, mut metric_overflow) =
            rank_metrics(&self.metrics, self.config.metrics_topk);
        let mut dropped_events: Vec<Value> = Vec::new();

        loop {
            let core = self.assemble(&kept_events, &kept_metrics, dropped_events.len(), paths)?;
            let size = serde_json::to_vec_pretty(&core)
                .map_err(|err| AiopError::Encode(err.to_string()))?
                .len();
            if size <= self.config.max_core_bytes {
                let truncated = !dropped_events.is_empty() || !metric_overflow.is_empty();
                if truncated && self.config.annex.enabled {
                    self.write_annex(paths, &dropped_events, &metric_overflow)?;
                }
                return Ok((core, truncated));
            }
            if let Some(victim) = pick_droppable(&kept_events) {
                dropped_events.push(kept_events.remove(victim));
                continue;
            }
            if !kept_metrics.is_empty() {
                metric_overflow.push(kept_metrics.pop().unwrap_or_default());
                continue;
            }
            // Nothing left to drop: emit the oversize core rather than an
            // empty package.
            let truncated = !dropped_events.is_empty() || !metric_overflow.is_empty();
            if truncated && self.config.annex.enabled {
                self.write_annex(paths, &dropped_events, &metric_overflow)?;
            }
            return Ok((core, truncated));
        }
    }

    /// Assembles one candidate core document.
    fn assemble(
        &self,
        events: &[Value],
        metrics: &[Value],
        dropped_events: usize,
        paths: &AiopPaths,
    ) -> Result<Value, AiopError> {
        let record = self.input.record;
        let manifest = self.input.manifest;
        let run_uri = format!("osiris://run/@{}", record.session_id);
        let pipeline_name = &manifest.pipeline.name;
        let start_ms = parse_rfc3339_millis(&record.started_at).unwrap_or_default();
        let run_fingerprint = sha256_hex(
            format!(
                "{OSIRIS_VERSION}:{}:{}:{}:{start_ms}",
                record.profile, record.manifest_hash, record.session_id
            )
            .as_bytes(),
        );

        let steps: Vec<Value> = manifest
            .pipeline
            .steps
            .iter()
            .map(|step| {
                json!({
                    "@id": format!(
                        "osiris://pipeline/{pipeline_name}@{}/step/{}",
                        record.manifest_hash, step.id
                    ),
                    "id": step.id,
                    "component": step.driver,
                    "mode": step.mode,
                    "needs": step.needs,
                })
            })
            .collect();
        let edges: Vec<Value> = manifest
            .pipeline
            .steps
            .iter()
            .flat_map(|step| {
                step.needs.iter().map(move |need| {
                    json!({"from": need, "to": step.id})
                })
            })
            .collect();

        let timeline_events: Vec<Value> = events
            .iter()
            .map(|event| annotate_evidence(event, "event"))
            .collect();
        let metric_items: Vec<Value> = metrics
            .iter()
            .map(|metric| annotate_evidence(metric, "metric"))
            .collect();

        let truncated = dropped_events > 0;
        let mut timeline = json!({
            "events": timeline_events,
            "truncated": truncated,
        });
        if truncated {
            timeline["dropped_events"] = json!(dropped_events);
            if self.config.annex.enabled {
                timeline["annex_ref"] = json!(paths
                    .annex_dir
                    .join(annex_file_name("timeline", self.config.annex.compress))
                    .display()
                    .to_string());
            }
        }

        let narrative_layer = narrative::build(record, manifest, events);
        Ok(json!({
            "@context": {
                "osiris": "osiris://",
                "ev": "osiris://evidence/",
            },
            "@id": run_uri,
            "narrative": narrative_layer,
            "semantic": {
                "pipeline": {
                    "name": pipeline_name,
                    "slug": record.pipeline_slug,
                    "manifest_hash": record.manifest_hash,
                },
                "nodes": steps,
                "edges": edges,
            },
            "evidence": {
                "timeline": timeline,
                "metrics": {
                    "items": metric_items,
                    "topk": self.config.metrics_topk,
                },
                "artifacts": self.artifacts,
            },
            "control": {},
            "metadata": {
                "osiris_version": OSIRIS_VERSION,
                "generated_at": format_rfc3339_millis(utc_now_ms()).unwrap_or_default(),
                "session_id": record.session_id,
                "run_id": record.run_id,
                "profile": record.profile,
                "pipeline_slug": record.pipeline_slug,
                "manifest_hash": record.manifest_hash,
                "manifest_short": record.manifest_short,
                "status": record.status,
                "started_at": record.started_at,
                "ended_at": record.ended_at,
                "run_fingerprint": run_fingerprint,
                "schema_mode": self.config.schema_mode,
                "delta": self.delta,
            },
        }))
    }

    /// Writes overflow shards into the annex directory.
    fn write_annex(
        &self,
        paths: &AiopPaths,
        dropped_events: &[Value],
        metric_overflow: &[Value],
    ) -> Result<(), AiopError> {
        ensure_dir(&paths.annex_dir).map_err(|err| AiopError::Io {
            path: paths.annex_dir.clone(),
            message: err.to_string(),
        })?;
        let error_overflow: Vec<&Value> = dropped_events
            .iter()
            .filter(|event| event_class(event) == 0)
            .collect();
        write_shard(
            &paths.annex_dir,
            "timeline",
            self.config.annex.compress,
            dropped_events.iter(),
        )?;
        write_shard(
            &paths.annex_dir,
            "metrics",
            self.config.annex.compress,
            metric_overflow.iter(),
        )?;
        write_shard(
            &paths.annex_dir,
            "errors",
            self.config.annex.compress,
            error_overflow.into_iter(),
        )?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Density, Ranking, Evidence
// ============================================================================

/// Priority class of an event: 0 errors/boundaries, 1 step frame, 2 other.
fn event_class(event: &Value) -> u8 {
    match event.get("event").and_then(Value::as_str).unwrap_or("") {
        "run_start" | "run_end" | "step_failed" | "error" | "cancelled" => 0,
        "step_start" | "step_complete" => 1,
        _ => 2,
    }
}

/// Applies the configured timeline density filter.
fn density_filter(events: &[Value], density: TimelineDensity) -> Vec<Value> {
    events
        .iter()
        .filter(|event| match density {
            TimelineDensity::Low => event_class(event) == 0,
            TimelineDensity::Medium => event_class(event) <= 1 || event.get("step_id").is_some(),
            TimelineDensity::High => true,
        })
        .cloned()
        .collect()
}

/// Importance rank of a metric name (lower ranks sort first).
fn metric_rank(metric: &Value) -> u8 {
    let name = metric.get("metric").and_then(Value::as_str).unwrap_or("");
    if name.contains("error") {
        0
    } else if name.contains("check") {
        1
    } else if name.contains("row") {
        2
    } else if name.contains("duration") {
        3
    } else {
        4
    }
}

/// Groups metrics by step then name, keeping the top-K by importance.
fn rank_metrics(metrics: &[Value], top_k: usize) -> (Vec<Value>, Vec<Value>) {
    let mut sorted: Vec<Value> = metrics.to_vec();
    sorted.sort_by(|left, right| {
        metric_rank(left)
            .cmp(&metric_rank(right))
            .then_with(|| {
                let step = |value: &Value| {
                    value.get("step_id").and_then(Value::as_str).unwrap_or("").to_string()
                };
                step(left).cmp(&step(right))
            })
            .then_with(|| {
                let name = |value: &Value| {
                    value.get("metric").and_then(Value::as_str).unwrap_or("").to_string()
                };
                name(left).cmp(&name(right))
            })
    });
    let overflow = sorted.split_off(top_k.min(sorted.len()));
    (sorted, overflow)
}

/// Picks the index of the lowest-priority droppable event.
fn pick_droppable(events: &[Value]) -> Option<usize> {
    for class in [2_u8, 1_u8] {
        if let Some(index) = events.iter().position(|event| event_class(event) == class) {
            return Some(index);
        }
    }
    None
}

/// Attaches a deterministic evidence id to a record.
fn annotate_evidence(record: &Value, kind: &str) -> Value {
    let mut annotated = record.clone();
    let step = record
        .get("step_id")
        .and_then(Value::as_str)
        .unwrap_or("run");
    let name = record
        .get("event")
        .or_else(|| record.get("metric"))
        .and_then(Value::as_str)
        .unwrap_or("record");
    let ms = record
        .get("ts")
        .and_then(Value::as_str)
        .and_then(|ts| parse_rfc3339_millis(ts).ok())
        .unwrap_or_default();
    if let Some(map) = annotated.as_object_mut() {
        map.insert(
            "evidence_id".to_string(),
            Value::String(format!("ev.{kind}.{step}.{}.{ms}", snake_name(name))),
        );
    }
    annotated
}

/// Restricts an evidence name to `[a-z0-9_]`.
fn snake_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
                lower
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// SECTION: Collection Helpers
// ============================================================================

/// Reads a JSONL file into values; a missing file yields no records.
fn read_jsonl(path: &Path) -> Result<Vec<Value>, AiopError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).map_err(|err| AiopError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

/// Walks the artifacts tree, hashing each file.
fn collect_artifacts(root: &Path) -> Result<Vec<Value>, AiopError> {
    let mut artifacts = Vec::new();
    if !root.is_dir() {
        return Ok(artifacts);
    }
    collect_artifacts_into(root, root, &mut artifacts)?;
    artifacts.sort_by(|left, right| {
        left.get("path")
            .and_then(Value::as_str)
            .unwrap_or("")
            .cmp(right.get("path").and_then(Value::as_str).unwrap_or(""))
    });
    Ok(artifacts)
}

/// Recursive artifact walk helper.
fn collect_artifacts_into(
    root: &Path,
    dir: &Path,
    out: &mut Vec<Value>,
) -> Result<(), AiopError> {
    let entries = fs::read_dir(dir).map_err(|err| AiopError::Io {
        path: dir.to_path_buf(),
        message: err.to_string(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|err| AiopError::Io {
            path: dir.to_path_buf(),
            message: err.to_string(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_artifacts_into(root, &path, out)?;
        } else {
            let bytes = fs::read(&path).map_err(|err| AiopError::Io {
                path: path.clone(),
                message: err.to_string(),
            })?;
            let rel = path.strip_prefix(root).unwrap_or(&path).display().to_string();
            out.push(json!({
                "path": rel,
                "size_bytes": bytes.len(),
                "content_hash": sha256_hex(&bytes),
            }));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Annex Writing
// ============================================================================

/// Returns the shard file name for a category and codec.
fn annex_file_name(category: &str, compress: AnnexCompression) -> String {
    match compress {
        AnnexCompression::Gzip => format!("{category}.ndjson.gz"),
        _ => format!("{category}.ndjson"),
    }
}

/// Writes one NDJSON shard, optionally gzip-compressed.
fn write_shard<'a>(
    annex_dir: &Path,
    category: &str,
    compress: AnnexCompression,
    records: impl Iterator<Item = &'a Value>,
) -> Result<(), AiopError> {
    let mut body = Vec::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|err| AiopError::Encode(err.to_string()))?;
        body.extend_from_slice(line.as_bytes());
        body.push(b'\n');
    }
    let path = annex_dir.join(annex_file_name(category, compress));
    let payload = if compress == AnnexCompression::Gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&body).map_err(|err| AiopError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?;
        encoder.finish().map_err(|err| AiopError::Io {
            path: path.clone(),
            message: err.to_string(),
        })?
    } else {
        body
    };
    replace_file(&path, &payload).map_err(|err| AiopError::Io {
        path,
        message: err.to_string(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
