// crates/osiris-aiop/src/narrative.rs
// ============================================================================
// Module: AIOP Narrative Layer
// Description: Rule-generated prose summarizing one run, citing evidence.
// Purpose: Produce the human layer of the package without any LLM.
// Dependencies: osiris-compiler, osiris-index, serde_json
// ============================================================================

//! ## Overview
//! The narrative is assembled from fixed sentence rules over the run
//! record and the collected events. Failed steps are cited inline by the
//! evidence ids of their `step_failed` events, so a reader can jump from
//! prose into the evidence layer. The Markdown run-card renders the same
//! content for humans.

// ============================================================================
// SECTION: Imports
// ============================================================================

use osiris_compiler::Manifest;
use osiris_core::time::parse_rfc3339_millis;
use osiris_index::RunRecord;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Narrative Layer
// ============================================================================

/// Builds the narrative layer for one run.
#[must_use]
pub fn build(record: &RunRecord, manifest: &Manifest, events: &[Value]) -> Value {
    let step_count = manifest.pipeline.steps.len();
    let mut text = format!(
        "Run {} of pipeline {} ({}) {} in {} ms, moving {} rows across {} step{}.",
        record.session_id,
        manifest.pipeline.name,
        record.profile,
        record.status,
        record.duration_ms,
        record.rows,
        step_count,
        if step_count == 1 { "" } else { "s" },
    );
    let mut cites = Vec::new();
    for event in events {
        if event.get("event").and_then(Value::as_str) == Some("step_failed") {
            let step = event.get("step_id").and_then(Value::as_str).unwrap_or("unknown");
            let kind = event.get("kind").and_then(Value::as_str).unwrap_or("other");
            let ms = event
                .get("ts")
                .and_then(Value::as_str)
                .and_then(|ts| parse_rfc3339_millis(ts).ok())
                .unwrap_or_default();
            let evidence = format!("ev.event.{step}.step_failed.{ms}");
            text.push_str(&format!(
                " Step {step} failed with kind {kind} [{evidence}]."
            ));
            cites.push(Value::String(evidence));
        }
    }
    json!({
        "text": text,
        "cites": cites,
    })
}

// ============================================================================
// SECTION: Run Card
// ============================================================================

/// Renders the Markdown run-card from a finished core document.
#[must_use]
pub fn render_run_card(core: &Value) -> String {
    let meta = &core["metadata"];
    let text = core["narrative"]["text"].as_str().unwrap_or("");
    let mut card = String::new();
    card.push_str(&format!(
        "# Run {}\n\n",
        meta["session_id"].as_str().unwrap_or("unknown")
    ));
    card.push_str(&format!(
        "- **Pipeline**: {}\n- **Profile**: {}\n- **Status**: {}\n- **Manifest**: `{}`\n\n",
        meta["pipeline_slug"].as_str().unwrap_or(""),
        meta["profile"].as_str().unwrap_or(""),
        meta["status"].as_str().unwrap_or(""),
        meta["manifest_short"].as_str().unwrap_or(""),
    ));
    card.push_str(text);
    card.push('\n');
    let delta = &meta["delta"];
    if delta.is_object() {
        if delta["first_run"].as_bool() == Some(true) {
            card.push_str("\nFirst recorded run of this manifest.\n");
        } else if let Some(previous) = delta["rows"]["previous"].as_u64() {
            card.push_str(&format!(
                "\nPrevious completed run moved {previous} rows.\n"
            ));
        }
    }
    card
}

// ============================================================================
// SECTION: Tests
// ============================================================================
