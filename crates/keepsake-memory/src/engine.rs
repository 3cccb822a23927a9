// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembled memory engine.
//!
//! Collaborators are constructed once and shared by handle; nothing here
//! is global.

use std::sync::Arc;

use keepsake_config::model::KeepsakeConfig;
use keepsake_core::{EmbeddingAdapter, KeepsakeError, ProviderAdapter};

use crate::backfill::backfill_embeddings;
use crate::conflict::ConflictResolver;
use crate::dedup::{DedupGate, FIND_SIMILAR_LIMIT, FIND_SIMILAR_MIN_SIMILARITY, SimilarEntry};
use crate::embedder::Embedder;
use crate::extractor::FactExtractor;
use crate::generator::{PersonaGenerator, ResponseGenerator};
use crate::ingest::MemoryIngestor;
use crate::orchestrator::{Orchestrator, TurnOutcome, TurnRequest};
use crate::ranker::{RankOptions, RelevanceRanker};
use crate::router::{IntentRouter, RouteDecision};
use crate::store::MemoryRepository;
use crate::types::{
    BackfillReport, CorpusEntry, DuplicateCheck, IngestOutcome, Memory, NewMemory, RetrievedItem,
    Supersession,
};

pub struct MemoryEngine {
    repo: Arc<dyn MemoryRepository>,
    embedder: Arc<Embedder>,
    dedup: Arc<DedupGate>,
    resolver: Arc<ConflictResolver>,
    ranker: Arc<RelevanceRanker>,
    router: Arc<IntentRouter>,
    ingestor: Arc<MemoryIngestor>,
    orchestrator: Orchestrator,
    rank_options: RankOptions,
}

impl MemoryEngine {
    /// Build an engine whose replies come from [`PersonaGenerator`].
    pub fn new(
        config: &KeepsakeConfig,
        repo: Arc<dyn MemoryRepository>,
        provider: Arc<dyn ProviderAdapter>,
        embedding: Arc<dyn EmbeddingAdapter>,
    ) -> Self {
        let generator = Arc::new(PersonaGenerator::new(
            provider.clone(),
            config.persona.system_prompt_template.clone(),
        ));
        Self::with_generator(config, repo, provider, embedding, generator)
    }

    /// Build an engine with a custom generation collaborator.
    pub fn with_generator(
        config: &KeepsakeConfig,
        repo: Arc<dyn MemoryRepository>,
        provider: Arc<dyn ProviderAdapter>,
        embedding: Arc<dyn EmbeddingAdapter>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let embedder = Arc::new(Embedder::new(embedding, config.llm.embedding_dimensions));
        let dedup = Arc::new(DedupGate::new(repo.clone(), embedder.clone()));
        let resolver = Arc::new(ConflictResolver::new(
            repo.clone(),
            embedder.clone(),
            provider.clone(),
        ));
        let ranker = Arc::new(RelevanceRanker::new(
            repo.clone(),
            embedder.clone(),
            config.retrieval.min_similarity,
        ));
        let router = Arc::new(IntentRouter::new(provider.clone()));
        let extractor = Arc::new(FactExtractor::new(provider));
        let ingestor = Arc::new(MemoryIngestor::new(
            repo.clone(),
            embedder.clone(),
            dedup.clone(),
            resolver.clone(),
        ));
        let rank_options = RankOptions::from(&config.retrieval);
        let orchestrator = Orchestrator::new(
            router.clone(),
            ranker.clone(),
            generator,
            extractor,
            ingestor.clone(),
            rank_options,
            config.retrieval.enabled,
            config.retrieval.max_recent_messages,
        );

        Self {
            repo,
            embedder,
            dedup,
            resolver,
            ranker,
            router,
            ingestor,
            orchestrator,
            rank_options,
        }
    }

    pub fn rank_options(&self) -> RankOptions {
        self.rank_options
    }

    /// Route, retrieve, generate and extract for one message.
    pub async fn turn(&self, request: &TurnRequest) -> TurnOutcome {
        self.orchestrator.run_turn(request).await
    }

    pub async fn ingest(&self, owner_id: &str, new: NewMemory) -> Result<IngestOutcome, KeepsakeError> {
        self.ingestor.ingest(owner_id, new).await
    }

    pub async fn route(&self, message: &str, subject_name: &str) -> RouteDecision {
        self.router.route(message, subject_name).await
    }

    pub async fn rank(
        &self,
        owner_id: &str,
        query: &str,
        options: &RankOptions,
        corpus: &[CorpusEntry],
    ) -> Vec<RetrievedItem> {
        self.ranker.rank(owner_id, query, options, corpus).await
    }

    pub async fn check_duplicate(&self, owner_id: &str, content: &str) -> DuplicateCheck {
        self.dedup.check(owner_id, content, None).await
    }

    /// Detect and apply a supersession for `content` without inserting it.
    pub async fn resolve_conflict(&self, owner_id: &str, content: &str) -> Option<Supersession> {
        self.resolver.resolve(owner_id, content, None).await
    }

    pub async fn find_similar(&self, owner_id: &str, content: &str) -> Vec<SimilarEntry> {
        self.dedup
            .find_similar(
                owner_id,
                content,
                FIND_SIMILAR_LIMIT,
                FIND_SIMILAR_MIN_SIMILARITY,
            )
            .await
    }

    pub async fn timeline(&self, owner_id: &str, limit: Option<usize>) -> Result<Vec<Memory>, KeepsakeError> {
        self.repo.timeline(owner_id, limit).await
    }

    pub async fn backfill(&self, batch_size: usize) -> Result<BackfillReport, KeepsakeError> {
        backfill_embeddings(self.repo.as_ref(), &self.embedder, batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Stage;
    use crate::generator::{APOLOGY, SubjectProfile};
    use crate::test_support::{StubEmbedder, StubProvider, memory_store};

    fn config() -> KeepsakeConfig {
        let mut config = KeepsakeConfig::default();
        config.llm.embedding_dimensions = 3;
        config
    }

    fn engine(stub: StubEmbedder, provider: Arc<StubProvider>, repo: Arc<dyn MemoryRepository>) -> MemoryEngine {
        MemoryEngine::new(&config(), repo, provider, Arc::new(stub))
    }

    #[tokio::test]
    async fn chat_turn_without_retrieval() {
        let provider = Arc::new(
            StubProvider::new()
                .reply(r#"{"route":"mentor_chat","reasoning":"venting"}"#)
                .reply("That sounds hard."),
        );
        let engine = engine(StubEmbedder::new(3), provider.clone(), Arc::new(memory_store().await));
        let outcome = engine
            .turn(&TurnRequest::new("o1", SubjectProfile::named("Alex"), "I feel awful"))
            .await;

        assert_eq!(outcome.reply, "That sounds hard.");
        assert!(outcome.retrieved.is_empty());
        assert!(outcome.extracted.is_none());
        assert_eq!(outcome.stages, vec![Stage::Route, Stage::Generate, Stage::Done]);
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn retrieval_turn_feeds_context_and_extracts() {
        let store = Arc::new(memory_store().await);
        let provider = Arc::new(
            StubProvider::new()
                .reply(r#"{"route":"memory_rag","reasoning":"asks about the past"}"#)
                .reply("You met at the lake.")
                .reply(r#"{"has_new_fact": true, "content_summary": "Alex visited the lake again", "sentiment_score": 3}"#),
        );
        let stub = StubEmbedder::new(3)
            .with("we met at the lake", vec![1.0, 0.0, 0.0])
            .with("she told me she went back to the lake", vec![0.9, 0.435_889_9, 0.0])
            .with("Alex visited the lake again", vec![0.0, 0.0, 1.0]);
        let engine = engine(stub, provider.clone(), store.clone());
        engine.ingest("o1", NewMemory::text("we met at the lake")).await.unwrap();

        let outcome = engine
            .turn(&TurnRequest::new(
                "o1",
                SubjectProfile::named("Alex"),
                "she told me she went back to the lake",
            ))
            .await;

        assert_eq!(
            outcome.stages,
            vec![Stage::Route, Stage::Retrieve, Stage::Generate, Stage::Extract, Stage::Done]
        );
        assert_eq!(outcome.retrieved.len(), 1);
        assert_eq!(outcome.retrieved[0].content, "we met at the lake");
        let requests = provider.requests();
        assert!(requests[1].messages[0].content.contains("we met at the lake"));

        let created = outcome.extracted.as_ref().and_then(|o| o.created()).unwrap();
        assert_eq!(created.content.as_deref(), Some("Alex visited the lake again"));
        assert_eq!(created.sentiment_score, 3);
        assert_eq!(created.extracted_facts["source"], "chat_analysis");
        assert_eq!(engine.timeline("o1", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn generation_failure_apologises_and_skips_extraction() {
        let provider = Arc::new(
            StubProvider::new()
                .reply(r#"{"route":"mentor_chat"}"#)
                .fail(),
        );
        let engine = engine(StubEmbedder::new(3), provider.clone(), Arc::new(memory_store().await));
        let outcome = engine
            .turn(&TurnRequest::new("o1", SubjectProfile::named("Alex"), "what happened today?"))
            .await;
        assert_eq!(outcome.reply, APOLOGY);
        assert_eq!(outcome.stages.last(), Some(&Stage::Done));
        assert!(!outcome.stages.contains(&Stage::Extract));
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn disabled_retrieval_skips_router_call() {
        let mut config = config();
        config.retrieval.enabled = false;
        let provider = Arc::new(StubProvider::new().reply("ok"));
        let engine = MemoryEngine::new(
            &config,
            Arc::new(memory_store().await),
            provider.clone(),
            Arc::new(StubEmbedder::new(3)),
        );
        let outcome = engine
            .turn(&TurnRequest::new("o1", SubjectProfile::named("Alex"), "when did we meet?"))
            .await;
        assert_eq!(outcome.reply, "ok");
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn history_is_truncated_to_most_recent() {
        let mut config = config();
        config.retrieval.max_recent_messages = 2;
        let provider = Arc::new(StubProvider::new().reply(r#"{"route":"mentor_chat"}"#).reply("ok"));
        let engine = MemoryEngine::new(
            &config,
            Arc::new(memory_store().await),
            provider.clone(),
            Arc::new(StubEmbedder::new(3)),
        );
        let history = (0..5)
            .map(|i| keepsake_core::types::ProviderMessage::user(format!("m{i}")))
            .collect();
        engine
            .turn(&TurnRequest::new("o1", SubjectProfile::named("Alex"), "hi").with_history(history))
            .await;
        let generation = &provider.requests()[1];
        let contents: Vec<&str> = generation.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["m3", "m4", "hi"]);
    }
}
