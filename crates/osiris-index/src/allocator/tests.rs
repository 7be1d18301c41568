// crates/osiris-index/src/allocator/tests.rs
// ============================================================================
// Module: Allocator Tests
// Description: Unit tests for run-id allocation and ULID generation.
// Purpose: Validate monotonicity, per-pair isolation, and ULID format.
// Dependencies: osiris-index, tempfile
// ============================================================================

//! ## Overview
//! Validates that allocations start at 1, stay gapless sequentially,
//! remain strictly increasing under concurrent threads sharing one store,
//! and that ULIDs are 26 Crockford characters, monotonic within a process.

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

use std::sync::Arc;
use std::thread;

use super::RunIdAllocator;
use super::UlidGenerator;

// ============================================================================
// SECTION: Sequential Allocation
// ============================================================================

#[test]
fn first_allocation_returns_one_then_counts_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let allocator = RunIdAllocator::open(&dir.path().join("counters.sqlite")).expect("open");
    assert_eq!(allocator.next("orders-etl", "dev").expect("next").get(), 1);
    assert_eq!(allocator.next("orders-etl", "dev").expect("next").get(), 2);
    assert_eq!(allocator.next("orders-etl", "dev").expect("next").get(), 3);
}

#[test]
fn pairs_count_independently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let allocator = RunIdAllocator::open(&dir.path().join("counters.sqlite")).expect("open");
    assert_eq!(allocator.next("orders-etl", "dev").expect("next").get(), 1);
    assert_eq!(allocator.next("orders-etl", "prod").expect("next").get(), 1);
    assert_eq!(allocator.next("customers-etl", "dev").expect("next").get(), 1);
    assert_eq!(allocator.next("orders-etl", "dev").expect("next").get(), 2);
}

#[test]
fn counters_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("counters.sqlite");
    {
        let allocator = RunIdAllocator::open(&path).expect("open");
        assert_eq!(allocator.next("orders-etl", "dev").expect("next").get(), 1);
    }
    let allocator = RunIdAllocator::open(&path).expect("reopen");
    assert_eq!(allocator.next("orders-etl", "dev").expect("next").get(), 2);
}

// ============================================================================
// SECTION: Concurrent Allocation
// ============================================================================

#[test]
fn concurrent_threads_never_repeat_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let allocator =
        Arc::new(RunIdAllocator::open(&dir.path().join("counters.sqlite")).expect("open"));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let allocator = Arc::clone(&allocator);
        handles.push(thread::spawn(move || {
            let mut ids = Vec::new();
            for _ in 0..25 {
                ids.push(allocator.next("orders-etl", "dev").expect("next").get());
            }
            ids
        }));
    }
    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("thread"))
        .collect();
    all.sort_unstable();
    let expected: Vec<u64> = (1..=100).collect();
    assert_eq!(all, expected);
}

#[test]
fn two_store_handles_share_one_sequence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("counters.sqlite");
    let first = Arc::new(RunIdAllocator::open(&path).expect("open"));
    let second = Arc::new(RunIdAllocator::open(&path).expect("open"));
    let mut handles = Vec::new();
    for allocator in [first, second] {
        handles.push(thread::spawn(move || {
            let mut ids = Vec::new();
            for _ in 0..20 {
                ids.push(allocator.next("orders-etl", "dev").expect("next").get());
            }
            ids
        }));
    }
    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("thread"))
        .collect();
    all.sort_unstable();
    let expected: Vec<u64> = (1..=40).collect();
    assert_eq!(all, expected);
}

// ============================================================================
// SECTION: ULIDs
// ============================================================================

#[test]
fn ulids_are_26_crockford_chars() {
    let generator = UlidGenerator::new();
    let ulid = generator.next();
    assert_eq!(ulid.len(), 26);
    assert!(ulid.chars().all(|ch| "0123456789ABCDEFGHJKMNPQRSTVWXYZ".contains(ch)));
}

#[test]
fn ulids_are_monotonic_within_process() {
    let generator = UlidGenerator::new();
    let mut previous = generator.next();
    for _ in 0..200 {
        let next = generator.next();
        assert!(next > previous, "{next} should sort after {previous}");
        previous = next;
    }
}

#[test]
fn session_id_uses_padded_run_id_and_short() {
    let dir = tempfile::tempdir().expect("tempdir");
    let allocator = RunIdAllocator::open(&dir.path().join("counters.sqlite")).expect("open");
    let run_id = allocator.next("orders-etl", "dev").expect("next");
    let short = osiris_core::ManifestShort::parse("ab34cd9").expect("short");
    let session = allocator.session_id(run_id, &short);
    assert!(session.as_str().starts_with("run-000001-"));
    assert!(session.as_str().ends_with("-ab34cd9"));
}
