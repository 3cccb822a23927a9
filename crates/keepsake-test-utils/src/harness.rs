// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete engine with mock adapters and a
//! temp SQLite database. Provides `chat()` and `remember()` to drive the
//! pipeline in tests.

use std::sync::Arc;

use keepsake_config::model::{KeepsakeConfig, StorageConfig};
use keepsake_core::KeepsakeError;
use keepsake_memory::{
    IngestOutcome, MemoryEngine, MemoryRepository, MemoryStore, NewMemory, SubjectProfile,
    TurnOutcome, TurnRequest,
};
use keepsake_storage::Database;

use crate::mock_embedder::MockEmbedder;
use crate::mock_provider::MockProvider;

/// Dimension used by the harness unless overridden.
pub const DEFAULT_TEST_DIMENSIONS: usize = 8;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    vectors: Vec<(String, Vec<f32>)>,
    config: KeepsakeConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = KeepsakeConfig::default();
        config.llm.embedding_dimensions = DEFAULT_TEST_DIMENSIONS;
        Self {
            responses: Vec::new(),
            vectors: Vec::new(),
            config,
        }
    }

    /// Set mock provider responses.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Register a fixed embedding for `text`.
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.push((text.to_string(), vector));
        self
    }

    /// Embedding dimension for both the mock embedder and the engine.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.config.llm.embedding_dimensions = dimensions;
        self
    }

    /// Adjust the configuration before the engine is built.
    pub fn with_config(mut self, edit: impl FnOnce(&mut KeepsakeConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, KeepsakeError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| KeepsakeError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let database = Database::from_config(&config.storage).await?;
        let store = MemoryStore::from_database(&database);

        let mock_provider = Arc::new(MockProvider::with_responses(self.responses));
        let mock_embedder = Arc::new(MockEmbedder::new(config.llm.embedding_dimensions));
        for (text, vector) in self.vectors {
            mock_embedder.set_vector(&text, vector);
        }

        let engine = MemoryEngine::new(
            &config,
            Arc::new(store.clone()),
            mock_provider.clone(),
            mock_embedder.clone(),
        );

        Ok(TestHarness {
            engine,
            store,
            database,
            mock_provider,
            mock_embedder,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// Engine under test.
    pub engine: MemoryEngine,
    /// Direct access to the memory store for assertions.
    pub store: MemoryStore,
    pub database: Database,
    pub mock_provider: Arc<MockProvider>,
    pub mock_embedder: Arc<MockEmbedder>,
    pub config: KeepsakeConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with defaults and an empty provider script.
    pub async fn new() -> Result<Self, KeepsakeError> {
        Self::builder().build().await
    }

    /// Run one orchestrator turn about `subject` for `owner_id`.
    pub async fn chat(&self, owner_id: &str, subject: &str, message: &str) -> TurnOutcome {
        self.engine
            .turn(&TurnRequest::new(owner_id, SubjectProfile::named(subject), message))
            .await
    }

    /// Ingest a plain text memory that happened now.
    pub async fn remember(&self, owner_id: &str, content: &str) -> Result<IngestOutcome, KeepsakeError> {
        self.engine.ingest(owner_id, NewMemory::text(content)).await
    }

    pub async fn active_count(&self, owner_id: &str) -> Result<usize, KeepsakeError> {
        self.store.count_active(owner_id).await
    }

    pub async fn add_provider_response(&self, text: impl Into<String>) {
        self.mock_provider.add_response(text).await;
    }

    pub fn repository(&self) -> Arc<dyn MemoryRepository> {
        Arc::new(self.store.clone())
    }
}
