// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-message pipeline as an explicit state machine:
//! `Route -> (Retrieve ->)? Generate -> (Extract ->)? Done`.
//!
//! Every stage fails open. A failed collaborator hands the next stage an
//! empty or default payload; the machine always reaches [`Stage::Done`].

use std::sync::Arc;

use keepsake_core::types::ProviderMessage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::extractor::{FactExtractor, needs_fact_extraction};
use crate::generator::{APOLOGY, GenerationContext, ResponseGenerator, SubjectProfile};
use crate::ingest::MemoryIngestor;
use crate::ranker::{RankOptions, RelevanceRanker};
use crate::router::{IntentRouter, RouteDecision};
use crate::types::{CorpusEntry, IngestOutcome, RetrievedItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Route,
    Retrieve,
    Generate,
    Extract,
    Done,
}

/// Facts gathered so far that drive transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnFlags {
    pub needs_retrieval: bool,
    pub generation_succeeded: bool,
    pub wants_extraction: bool,
}

/// Pure transition function.
pub fn next_stage(stage: Stage, flags: TurnFlags) -> Stage {
    match stage {
        Stage::Route if flags.needs_retrieval => Stage::Retrieve,
        Stage::Route | Stage::Retrieve => Stage::Generate,
        Stage::Generate if flags.generation_succeeded && flags.wants_extraction => Stage::Extract,
        Stage::Generate | Stage::Extract | Stage::Done => Stage::Done,
    }
}

/// One inbound user message and its surroundings.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub owner_id: String,
    pub subject: SubjectProfile,
    pub user_message: String,
    /// Prior dialogue, oldest first.
    pub recent_messages: Vec<ProviderMessage>,
    pub corpus: Vec<CorpusEntry>,
}

impl TurnRequest {
    pub fn new(
        owner_id: impl Into<String>,
        subject: SubjectProfile,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            subject,
            user_message: user_message.into(),
            recent_messages: Vec::new(),
            corpus: Vec::new(),
        }
    }

    pub fn with_history(mut self, messages: Vec<ProviderMessage>) -> Self {
        self.recent_messages = messages;
        self
    }

    pub fn with_corpus(mut self, corpus: Vec<CorpusEntry>) -> Self {
        self.corpus = corpus;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub route: RouteDecision,
    pub retrieved: Vec<RetrievedItem>,
    /// Result of committing an extracted fact, if one was committed or skipped.
    pub extracted: Option<IngestOutcome>,
    /// Stages visited, in order, ending with [`Stage::Done`].
    pub stages: Vec<Stage>,
}

pub struct Orchestrator {
    router: Arc<IntentRouter>,
    ranker: Arc<RelevanceRanker>,
    generator: Arc<dyn ResponseGenerator>,
    extractor: Arc<FactExtractor>,
    ingestor: Arc<MemoryIngestor>,
    rank_options: RankOptions,
    retrieval_enabled: bool,
    max_recent_messages: usize,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<IntentRouter>,
        ranker: Arc<RelevanceRanker>,
        generator: Arc<dyn ResponseGenerator>,
        extractor: Arc<FactExtractor>,
        ingestor: Arc<MemoryIngestor>,
        rank_options: RankOptions,
        retrieval_enabled: bool,
        max_recent_messages: usize,
    ) -> Self {
        Self {
            router,
            ranker,
            generator,
            extractor,
            ingestor,
            rank_options,
            retrieval_enabled,
            max_recent_messages,
        }
    }

    /// Run one message through the pipeline.
    pub async fn run_turn(&self, request: &TurnRequest) -> TurnOutcome {
        let history_start = request
            .recent_messages
            .len()
            .saturating_sub(self.max_recent_messages);
        let history = &request.recent_messages[history_start..];

        let mut flags = TurnFlags::default();
        let mut route = RouteDecision::default();
        let mut retrieved = Vec::new();
        let mut reply = String::new();
        let mut extracted = None;
        let mut stages = Vec::new();
        let mut stage = Stage::Route;

        loop {
            stages.push(stage);
            match stage {
                Stage::Route => {
                    if self.retrieval_enabled {
                        route = self
                            .router
                            .route(&request.user_message, &request.subject.name)
                            .await;
                    }
                    flags.needs_retrieval = route.needs_retrieval();
                }
                Stage::Retrieve => {
                    retrieved = self
                        .ranker
                        .rank(
                            &request.owner_id,
                            &request.user_message,
                            &self.rank_options,
                            &request.corpus,
                        )
                        .await;
                }
                Stage::Generate => {
                    let context = GenerationContext {
                        subject: &request.subject,
                        retrieved: &retrieved,
                        recent_messages: history,
                        user_message: &request.user_message,
                    };
                    match self.generator.generate(&context).await {
                        Ok(text) => {
                            reply = text;
                            flags.generation_succeeded = true;
                            flags.wants_extraction = needs_fact_extraction(&request.user_message);
                        }
                        Err(e) => {
                            warn!(owner_id = %request.owner_id, error = %e, "generation failed");
                            reply = APOLOGY.to_string();
                        }
                    }
                }
                Stage::Extract => {
                    extracted = self.extract(&request.owner_id, &request.user_message).await;
                }
                Stage::Done => break,
            }
            stage = next_stage(stage, flags);
        }

        debug!(owner_id = %request.owner_id, ?stages, "turn complete");
        TurnOutcome {
            reply,
            route,
            retrieved,
            extracted,
            stages,
        }
    }

    async fn extract(&self, owner_id: &str, message: &str) -> Option<IngestOutcome> {
        let fact = self.extractor.extract(message).await?;
        match self.ingestor.ingest(owner_id, fact.into_new_memory()).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(owner_id, error = %e, "failed to commit extracted fact");
                None
            }
        }
    }
}
