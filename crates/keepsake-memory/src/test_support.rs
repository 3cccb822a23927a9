// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-crate stubs for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use keepsake_core::types::{
    EmbeddingInput, EmbeddingOutput, ProviderRequest, ProviderResponse, TokenUsage,
};
use keepsake_core::{
    AdapterType, EmbeddingAdapter, HealthStatus, KeepsakeError, PluginAdapter, ProviderAdapter,
};
use keepsake_storage::Database;

use crate::store::{MemoryRepository, MemoryStore};
use crate::types::{Memory, SimilarMemory};

pub async fn memory_store() -> MemoryStore {
    let db = Database::open_in_memory().await.unwrap();
    MemoryStore::from_database(&db)
}

/// Embeds known texts from a table; unknown texts get a byte-hash vector.
pub struct StubEmbedder {
    dimensions: usize,
    table: HashMap<String, Vec<f32>>,
    fail: bool,
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            table: HashMap::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.table.get(text) {
            return v.clone();
        }
        let mut v = vec![0.0; self.dimensions];
        for (i, b) in text.bytes().enumerate() {
            v[(i + b as usize) % self.dimensions] += 1.0;
        }
        v
    }
}

#[async_trait]
impl PluginAdapter for StubEmbedder {
    fn name(&self) -> &str {
        "stub-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 0, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl EmbeddingAdapter for StubEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, KeepsakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(KeepsakeError::provider("stub embedder down"));
        }
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| self.vector_for(t)).collect(),
            dimensions: self.dimensions,
        })
    }
}

/// Replies from a FIFO script; an exhausted script is a provider failure.
#[derive(Default)]
pub struct StubProvider {
    replies: Mutex<VecDeque<Result<String, KeepsakeError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(KeepsakeError::provider("stub provider down")));
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PluginAdapter for StubProvider {
    fn name(&self) -> &str {
        "stub-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 0, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, KeepsakeError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderAdapter for StubProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, KeepsakeError> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(KeepsakeError::provider("no scripted reply")));
        next.map(|content| ProviderResponse {
            id: "stub".into(),
            content,
            model: "stub-model".into(),
            stop_reason: Some("stop".into()),
            usage: TokenUsage::default(),
        })
    }
}

#[derive(Default)]
struct Faults {
    search: bool,
    insert: bool,
    mark_outdated: bool,
}

/// Delegates to a real store but fails selected operations.
pub struct FaultyStore {
    inner: MemoryStore,
    faults: Faults,
}

impl FaultyStore {
    pub fn failing_search(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Faults {
                search: true,
                ..Faults::default()
            },
        }
    }

    /// Fails both plain and superseding inserts.
    pub fn failing_insert(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Faults {
                insert: true,
                ..Faults::default()
            },
        }
    }

    pub fn failing_mark_outdated(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Faults {
                mark_outdated: true,
                ..Faults::default()
            },
        }
    }
}

fn injected() -> KeepsakeError {
    KeepsakeError::Internal("injected fault".into())
}

#[async_trait]
impl MemoryRepository for FaultyStore {
    async fn insert(&self, memory: &Memory) -> Result<(), KeepsakeError> {
        if self.faults.insert {
            return Err(injected());
        }
        self.inner.insert(memory).await
    }

    async fn insert_superseding(
        &self,
        memory: &Memory,
        replaced_id: &str,
    ) -> Result<bool, KeepsakeError> {
        if self.faults.insert {
            return Err(injected());
        }
        self.inner.insert_superseding(memory, replaced_id).await
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, KeepsakeError> {
        self.inner.get(id).await
    }

    async fn search_similar(
        &self,
        owner_id: &str,
        query: &[f32],
        limit: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<SimilarMemory>, KeepsakeError> {
        if self.faults.search {
            return Err(injected());
        }
        self.inner
            .search_similar(owner_id, query, limit, min_similarity)
            .await
    }

    async fn mark_outdated(&self, id: &str) -> Result<bool, KeepsakeError> {
        if self.faults.mark_outdated {
            return Err(injected());
        }
        self.inner.mark_outdated(id).await
    }

    async fn find_by_content_hash(
        &self,
        owner_id: &str,
        hash: &str,
    ) -> Result<Option<Memory>, KeepsakeError> {
        self.inner.find_by_content_hash(owner_id, hash).await
    }

    async fn recent_active(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, KeepsakeError> {
        self.inner.recent_active(owner_id, limit).await
    }

    async fn timeline(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>, KeepsakeError> {
        self.inner.timeline(owner_id, limit).await
    }

    async fn missing_embeddings(&self) -> Result<Vec<(String, String)>, KeepsakeError> {
        self.inner.missing_embeddings().await
    }

    async fn set_embedding(&self, id: &str, embedding: &[f32]) -> Result<(), KeepsakeError> {
        self.inner.set_embedding(id, embedding).await
    }
}
