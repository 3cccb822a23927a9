// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; installing a recorder is up to the host process.

use metrics::describe_counter;

/// Register all engine metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "keepsake_dedup_hits_total",
        "Candidate facts rejected as duplicates"
    );
    describe_counter!(
        "keepsake_supersessions_total",
        "Existing memories marked outdated by a conflicting new fact"
    );
    describe_counter!(
        "keepsake_retrieval_fallbacks_total",
        "Retrievals served by keyword fallback instead of vector search"
    );
    describe_counter!(
        "keepsake_memories_created_total",
        "Memories committed to the store"
    );
}

pub fn record_dedup_hit() {
    metrics::counter!("keepsake_dedup_hits_total").increment(1);
}

pub fn record_supersession() {
    metrics::counter!("keepsake_supersessions_total").increment(1);
}

pub fn record_retrieval_fallback() {
    metrics::counter!("keepsake_retrieval_fallbacks_total").increment(1);
}

pub fn record_memory_created(source_type: &str) {
    metrics::counter!("keepsake_memories_created_total", "source_type" => source_type.to_string())
        .increment(1);
}
