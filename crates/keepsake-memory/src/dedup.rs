// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deduplication gate: rejects a new fact when a near-identical active
//! fact already exists for the same owner.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embedder::Embedder;
use crate::store::MemoryRepository;
use crate::types::{DuplicateCheck, is_zero_vector};

/// Similarity at or above which two facts count as duplicates.
pub const DEDUP_THRESHOLD: f32 = 0.92;

/// Defaults for [`DedupGate::find_similar`].
pub const FIND_SIMILAR_LIMIT: usize = 5;
pub const FIND_SIMILAR_MIN_SIMILARITY: f32 = 0.7;

/// A near match reported by [`DedupGate::find_similar`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarEntry {
    pub id: String,
    pub content: String,
    pub similarity: f32,
}

pub struct DedupGate {
    repo: Arc<dyn MemoryRepository>,
    embedder: Arc<Embedder>,
}

impl DedupGate {
    pub fn new(repo: Arc<dyn MemoryRepository>, embedder: Arc<Embedder>) -> Self {
        Self { repo, embedder }
    }

    /// Check `content` against the nearest active record of `owner_id`.
    ///
    /// Blank content, a zero-vector embedding or a failed search yields
    /// "not duplicate" so that facts are never dropped for lack of signal.
    /// Read-only.
    pub async fn check(
        &self,
        owner_id: &str,
        content: &str,
        embedding: Option<&[f32]>,
    ) -> DuplicateCheck {
        if content.trim().is_empty() {
            return DuplicateCheck::not_duplicate();
        }

        let computed;
        let embedding: &[f32] = match embedding {
            Some(e) => e,
            None => {
                computed = self.embedder.embed(content).await;
                computed.as_slice()
            }
        };

        if is_zero_vector(embedding) {
            debug!(owner_id, "no embedding signal, skipping duplicate check");
            return DuplicateCheck::not_duplicate();
        }

        match self.repo.nearest(owner_id, embedding).await {
            Ok(Some(nearest)) => {
                let is_duplicate = nearest.similarity >= DEDUP_THRESHOLD;
                if is_duplicate {
                    debug!(
                        owner_id,
                        matched_id = %nearest.memory.id,
                        similarity = nearest.similarity,
                        "duplicate memory detected"
                    );
                }
                DuplicateCheck {
                    is_duplicate,
                    matched_id: Some(nearest.memory.id),
                    similarity: Some(nearest.similarity),
                }
            }
            Ok(None) => DuplicateCheck::not_duplicate(),
            Err(e) => {
                warn!(owner_id, error = %e, "duplicate check failed, treating as new");
                DuplicateCheck::not_duplicate()
            }
        }
    }

    /// Active records of `owner_id` similar to `content`, for inspection.
    /// Empty on any failure.
    pub async fn find_similar(
        &self,
        owner_id: &str,
        content: &str,
        limit: usize,
        min_similarity: f32,
    ) -> Vec<SimilarEntry> {
        let embedding = self.embedder.embed(content).await;
        if is_zero_vector(&embedding) {
            return Vec::new();
        }

        match self
            .repo
            .search_similar(owner_id, &embedding, limit, Some(min_similarity))
            .await
        {
            Ok(results) => results
                .into_iter()
                .map(|r| SimilarEntry {
                    id: r.memory.id,
                    content: r.memory.content.unwrap_or_default(),
                    similarity: r.similarity,
                })
                .collect(),
            Err(e) => {
                warn!(owner_id, error = %e, "similar-memory search failed");
                Vec::new()
            }
        }
    }
}
