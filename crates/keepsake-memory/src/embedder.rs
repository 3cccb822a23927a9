// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider with zero-vector degradation.
//!
//! Wraps any [`EmbeddingAdapter`] and guarantees a vector of the configured
//! dimension for every input. Blank input never reaches the remote service;
//! remote failures and malformed responses are logged and yield a zero
//! vector, which downstream components treat as "no signal".

use std::sync::Arc;

use keepsake_core::EmbeddingAdapter;
use keepsake_core::types::EmbeddingInput;
use tracing::{debug, warn};

pub struct Embedder {
    adapter: Arc<dyn EmbeddingAdapter>,
    dimensions: usize,
}

impl Embedder {
    pub fn new(adapter: Arc<dyn EmbeddingAdapter>, dimensions: usize) -> Self {
        Self {
            adapter,
            dimensions,
        }
    }

    pub fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.dimensions]
    }

    /// Embed one text. Never fails; see the module docs for the degraded cases.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return self.zero_vector();
        }

        let input = EmbeddingInput {
            texts: vec![text.to_string()],
        };
        match self.adapter.embed(input).await {
            Ok(output) => match output.embeddings.into_iter().next() {
                Some(v) if v.len() == self.dimensions => {
                    debug!(chars = text.len(), "generated embedding");
                    v
                }
                Some(v) => {
                    warn!(
                        expected = self.dimensions,
                        got = v.len(),
                        "embedding dimension mismatch, using zero vector"
                    );
                    self.zero_vector()
                }
                None => {
                    warn!("embedding service returned no vectors, using zero vector");
                    self.zero_vector()
                }
            },
            Err(e) => {
                warn!(error = %e, "embedding generation failed, using zero vector");
                self.zero_vector()
            }
        }
    }

    /// Embed many texts with one remote call.
    ///
    /// Blank entries are sent as a single space so positions line up. On
    /// failure or a short response every text gets a zero vector.
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }

        let input = EmbeddingInput {
            texts: texts
                .iter()
                .map(|t| {
                    if t.trim().is_empty() {
                        " ".to_string()
                    } else {
                        t.clone()
                    }
                })
                .collect(),
        };

        match self.adapter.embed(input).await {
            Ok(output) if output.embeddings.len() == texts.len() => output
                .embeddings
                .into_iter()
                .map(|v| {
                    if v.len() == self.dimensions {
                        v
                    } else {
                        self.zero_vector()
                    }
                })
                .collect(),
            Ok(output) => {
                warn!(
                    expected = texts.len(),
                    got = output.embeddings.len(),
                    "batch embedding count mismatch, using zero vectors"
                );
                vec![self.zero_vector(); texts.len()]
            }
            Err(e) => {
                warn!(error = %e, count = texts.len(), "batch embedding failed, using zero vectors");
                vec![self.zero_vector(); texts.len()]
            }
        }
    }
}
