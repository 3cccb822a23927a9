// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive memory retrieval and consistency engine.
//!
//! Decides whether a message needs historical context, ranks stored
//! memories by relevance and recency, keeps duplicates out of the store,
//! and supersedes facts that newer ones contradict.
//!
//! ## Architecture
//!
//! - **Embedder**: embedding calls that degrade to zero vectors on failure
//! - **MemoryStore**: SQLite persistence with in-process cosine search
//! - **DedupGate**: rejects near-identical facts (similarity >= 0.92)
//! - **ConflictResolver**: vector candidates + LLM adjudication, marks old facts outdated
//! - **RelevanceRanker**: similarity/recency scoring with keyword fallback
//! - **IntentRouter**: classifies whether a message needs retrieval
//! - **MemoryIngestor**: per-owner serialized commit pipeline
//! - **Orchestrator**: route, retrieve, generate, extract state machine
//! - **MemoryEngine**: everything above wired from configuration

pub mod backfill;
pub mod conflict;
pub mod dedup;
pub mod embedder;
pub mod engine;
pub mod extractor;
pub mod generator;
pub mod ingest;
pub mod metrics;
pub mod orchestrator;
pub mod ranker;
pub mod router;
pub mod store;
pub mod template;
pub mod types;

#[cfg(test)]
mod test_support;

pub use backfill::backfill_embeddings;
pub use conflict::ConflictResolver;
pub use dedup::{DedupGate, SimilarEntry};
pub use embedder::Embedder;
pub use engine::MemoryEngine;
pub use extractor::{ExtractedFact, FactExtractor};
pub use generator::{GenerationContext, PersonaGenerator, ResponseGenerator, SubjectProfile};
pub use ingest::MemoryIngestor;
pub use orchestrator::{Orchestrator, Stage, TurnOutcome, TurnRequest};
pub use ranker::{RankOptions, RankPath, RelevanceRanker};
pub use router::{IntentRouter, Route, RouteDecision};
pub use store::{MemoryRepository, MemoryStore};
pub use types::*;
