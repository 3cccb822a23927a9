// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding backfill for records stored without a vector.

use keepsake_core::KeepsakeError;
use tracing::{info, warn};

use crate::embedder::Embedder;
use crate::store::MemoryRepository;
use crate::types::{BackfillReport, is_zero_vector};

pub const DEFAULT_BACKFILL_BATCH_SIZE: usize = 50;

/// Embed every active record that has content but no embedding.
///
/// Zero vectors are not stored, so a record whose batch failed stays
/// eligible for the next run.
pub async fn backfill_embeddings(
    repo: &dyn MemoryRepository,
    embedder: &Embedder,
    batch_size: usize,
) -> Result<BackfillReport, KeepsakeError> {
    let pending = repo.missing_embeddings().await?;
    let mut report = BackfillReport::default();
    if pending.is_empty() {
        return Ok(report);
    }
    info!(count = pending.len(), "backfilling embeddings");

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, content)| content.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await;

        for ((id, _), vector) in batch.iter().zip(vectors) {
            if is_zero_vector(&vector) {
                report.failed += 1;
                continue;
            }
            match repo.set_embedding(id, &vector).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(memory_id = %id, error = %e, "failed to store embedding");
                    report.failed += 1;
                }
            }
        }
    }

    info!(processed = report.processed, failed = report.failed, "backfill complete");
    Ok(report)
}
