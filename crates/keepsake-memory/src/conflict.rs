// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conflict resolver: detects when a new fact updates or contradicts an
//! existing one and supersedes the old record.
//!
//! Detection runs in two stages. Vector search narrows the owner's active
//! records to a few close candidates; a language model then decides, one
//! candidate at a time in similarity order, whether the pair is about the
//! same topic with different information. Similarity alone cannot tell
//! "contradicts" apart from "about the same general subject".

use std::sync::Arc;

use keepsake_core::ProviderAdapter;
use keepsake_core::types::ProviderRequest;
use tracing::{debug, info, warn};

use crate::embedder::Embedder;
use crate::store::MemoryRepository;
use crate::template::fill_placeholders;
use crate::types::{SimilarMemory, Supersession, is_zero_vector};

/// Minimum similarity for a record to be considered a conflict candidate.
pub const CONFLICT_CANDIDATE_THRESHOLD: f32 = 0.75;

/// At most this many candidates are sent to adjudication.
pub const MAX_CONFLICT_CANDIDATES: usize = 3;

const ADJUDICATION_PROMPT: &str = r#"Decide whether the two memories below, both about the same person, conflict.

Two memories conflict when they describe the same topic or fact but the information differs or has been updated.
Examples:
- "She likes coffee" vs "She doesn't like coffee" -> yes
- "She lives in Berlin" vs "She moved to Lisbon" -> yes
- "She likes films" vs "She likes coffee" -> no (different topics)

Memory A (new): {new}

Memory B (existing): {existing}

Answer with a single word, "yes" or "no".
Answer:"#;

pub struct ConflictResolver {
    repo: Arc<dyn MemoryRepository>,
    embedder: Arc<Embedder>,
    provider: Arc<dyn ProviderAdapter>,
}

impl ConflictResolver {
    pub fn new(
        repo: Arc<dyn MemoryRepository>,
        embedder: Arc<Embedder>,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Self {
        Self {
            repo,
            embedder,
            provider,
        }
    }

    /// Find the first active record the adjudicator considers superseded by
    /// `new_content`. Read-only. `None` for blank content, on no conflict or
    /// on any failure.
    pub async fn detect(
        &self,
        owner_id: &str,
        new_content: &str,
        embedding: Option<&[f32]>,
    ) -> Option<SimilarMemory> {
        if new_content.trim().is_empty() {
            return None;
        }

        let computed;
        let embedding: &[f32] = match embedding {
            Some(e) => e,
            None => {
                computed = self.embedder.embed(new_content).await;
                computed.as_slice()
            }
        };
        if is_zero_vector(embedding) {
            return None;
        }

        let candidates = match self
            .repo
            .search_similar(
                owner_id,
                embedding,
                MAX_CONFLICT_CANDIDATES,
                Some(CONFLICT_CANDIDATE_THRESHOLD),
            )
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(owner_id, error = %e, "conflict candidate search failed");
                return None;
            }
        };

        for candidate in candidates {
            let Some(existing) = candidate.memory.text() else {
                continue;
            };
            if self.adjudicate(new_content, existing).await {
                debug!(
                    owner_id,
                    memory_id = %candidate.memory.id,
                    similarity = candidate.similarity,
                    "conflict confirmed"
                );
                return Some(candidate);
            }
        }
        None
    }

    /// Detect a conflict and mark the matched record outdated.
    ///
    /// Returns `None` when nothing conflicts, when the record was no longer
    /// active at mutation time, or on any failure.
    pub async fn resolve(
        &self,
        owner_id: &str,
        new_content: &str,
        embedding: Option<&[f32]>,
    ) -> Option<Supersession> {
        let candidate = self.detect(owner_id, new_content, embedding).await?;
        let id = candidate.memory.id.clone();

        match self.repo.mark_outdated(&id).await {
            Ok(true) => {
                crate::metrics::record_supersession();
                info!(owner_id, memory_id = %id, similarity = candidate.similarity, "memory marked outdated");
                Some(Supersession {
                    replaced_memory_id: id,
                    replaced_content: candidate.memory.content.unwrap_or_default(),
                    similarity: candidate.similarity,
                })
            }
            Ok(false) => {
                warn!(owner_id, memory_id = %id, "conflict target no longer active");
                None
            }
            Err(e) => {
                warn!(owner_id, memory_id = %id, error = %e, "failed to mark memory outdated");
                None
            }
        }
    }

    /// Ask the model whether `new` and `existing` conflict. Failures answer "no".
    async fn adjudicate(&self, new: &str, existing: &str) -> bool {
        let prompt = fill_placeholders(ADJUDICATION_PROMPT, &[("new", new), ("existing", existing)]);
        let request = ProviderRequest::single_turn(prompt)
            .with_temperature(0.1)
            .with_max_tokens(10);

        match self.provider.complete(request).await {
            Ok(response) => parse_adjudication(&response.content),
            Err(e) => {
                warn!(error = %e, "conflict adjudication failed, assuming no conflict");
                false
            }
        }
    }
}

/// Interpret an adjudicator answer. Only an explicit leading "yes" counts.
pub fn parse_adjudication(answer: &str) -> bool {
    let normalized = answer
        .trim()
        .trim_start_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .to_lowercase();
    normalized.starts_with("yes") || normalized.starts_with('是')
}
