// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding adapter with a deterministic text-to-vector table.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use keepsake_core::types::{EmbeddingInput, EmbeddingOutput};
use keepsake_core::{
    AdapterType, EmbeddingAdapter, HealthStatus, KeepsakeError, PluginAdapter,
};

/// Returns registered vectors for known texts and a hashed bag-of-bytes
/// vector for anything else. Can be switched into a failing state at any
/// point in a test.
pub struct MockEmbedder {
    dimensions: usize,
    table: StdMutex<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            table: StdMutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Register the vector returned for `text`.
    pub fn with_vector(self, text: &str, vector: Vec<f32>) -> Self {
        self.set_vector(text, vector);
        self
    }

    pub fn set_vector(&self, text: &str, vector: Vec<f32>) {
        if let Ok(mut table) = self.table.lock() {
            table.insert(text.to_string(), vector);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed` calls received, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.table.lock().ok().and_then(|t| t.get(text).cloned()) {
            return v;
        }
        let mut v = vec![0.0; self.dimensions];
        for (i, b) in text.bytes().enumerate() {
            v[(i * 31 + b as usize) % self.dimensions] += 1.0;
        }
        v
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        if self.failing.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("failure injected".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeepsakeError::provider("mock embedder failure"));
        }
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| self.vector_for(t)).collect(),
            dimensions: self.dimensions,
        })
    }
}
