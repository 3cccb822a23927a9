// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relevance ranker combining semantic similarity with recency.
//!
//! Primary path: embed the query, fetch `2 * max_results` active candidates
//! above the similarity floor, score each as
//! `similarity * 0.8 + time_factor * 0.2` where
//! `time_factor = 1 / (1 + days_ago * time_decay_factor)`, and keep those at
//! or above `min_relevance_score`.
//!
//! Auxiliary corpus entries are scored by keyword overlap and merged in.
//! When the vector stage cannot run, stored memories are keyword-scored
//! instead; the result shape is identical either way.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use keepsake_config::model::RetrievalConfig;
use keepsake_core::KeepsakeError;
use tracing::{debug, error, info, warn};

use crate::embedder::Embedder;
use crate::store::MemoryRepository;
use crate::types::{CORPUS_SOURCE_TYPE, CorpusEntry, Memory, RetrievedItem, is_zero_vector};

const SIMILARITY_WEIGHT: f64 = 0.8;
const RECENCY_WEIGHT: f64 = 0.2;
const KEYWORD_HIT_SCORE: f64 = 0.3;
const KEYWORD_BASELINE_SCORE: f64 = 0.05;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Per-call ranking parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankOptions {
    pub max_results: usize,
    pub time_decay_factor: f64,
    pub min_relevance_score: f64,
}

impl From<&RetrievalConfig> for RankOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_results: config.max_memories,
            time_decay_factor: config.time_decay_factor,
            min_relevance_score: config.min_relevance_score,
        }
    }
}

/// Which scoring path produced a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankPath {
    Vector,
    KeywordFallback,
}

/// `1 / (1 + days_ago * decay)`. Future events count as zero days ago.
pub fn time_factor(days_ago: f64, time_decay_factor: f64) -> f64 {
    1.0 / (1.0 + days_ago.max(0.0) * time_decay_factor)
}

/// `similarity * 0.8 + time_factor * 0.2`.
pub fn combined_score(similarity: f64, time_factor: f64) -> f64 {
    similarity * SIMILARITY_WEIGHT + time_factor * RECENCY_WEIGHT
}

/// Fractional days between `happened_at` and `now`.
pub fn days_between(happened_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - happened_at).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

/// Distinct lower-cased whitespace-separated query tokens.
pub fn query_keywords(query: &str) -> BTreeSet<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

/// Number of query keywords occurring in `content` (case-insensitive substring match).
pub fn keyword_hits(keywords: &BTreeSet<String>, content: &str) -> usize {
    let content = content.to_lowercase();
    keywords.iter().filter(|k| content.contains(k.as_str())).count()
}

/// `0.3 * hits`, or a weak `0.05` baseline when nothing matched.
pub fn keyword_score(hits: usize) -> f64 {
    if hits > 0 {
        KEYWORD_HIT_SCORE * hits as f64
    } else {
        KEYWORD_BASELINE_SCORE
    }
}

/// Score auxiliary corpus entries. Entries are never dropped by the relevance
/// floor; the baseline score keeps them eligible for leftover slots.
pub fn score_corpus(
    keywords: &BTreeSet<String>,
    corpus: &[CorpusEntry],
    now: DateTime<Utc>,
) -> Vec<RetrievedItem> {
    corpus
        .iter()
        .filter(|entry| !entry.content.trim().is_empty())
        .map(|entry| RetrievedItem {
            memory_id: None,
            content: entry.content.clone(),
            happened_at: now,
            source_type: CORPUS_SOURCE_TYPE.to_string(),
            sentiment_score: 0,
            relevance_score: keyword_score(keyword_hits(keywords, &entry.content)),
        })
        .collect()
}

/// Keyword-score stored memories, weighted by recency.
///
/// Memories with at least one keyword hit are always kept; baseline-only
/// matches must still clear `min_relevance_score`.
pub fn score_memories_by_keyword(
    keywords: &BTreeSet<String>,
    memories: Vec<Memory>,
    options: &RankOptions,
    now: DateTime<Utc>,
) -> Vec<RetrievedItem> {
    memories
        .into_iter()
        .filter_map(|memory| {
            let content = memory.text()?.to_string();
            let hits = keyword_hits(keywords, &content);
            let tf = time_factor(
                days_between(memory.happened_at, now),
                options.time_decay_factor,
            );
            let score = keyword_score(hits) * tf;
            if hits == 0 && score < options.min_relevance_score {
                return None;
            }
            Some(item_from_memory(memory, content, score))
        })
        .collect()
}

fn item_from_memory(memory: Memory, content: String, relevance_score: f64) -> RetrievedItem {
    RetrievedItem {
        memory_id: Some(memory.id),
        content,
        happened_at: memory.happened_at,
        source_type: memory.source_type,
        sentiment_score: memory.sentiment_score,
        relevance_score,
    }
}

/// Sort descending by score (stable) and keep the top `max_results`.
pub fn merge_and_truncate(mut items: Vec<RetrievedItem>, max_results: usize) -> Vec<RetrievedItem> {
    items.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    items.truncate(max_results);
    items
}

pub struct RelevanceRanker {
    repo: Arc<dyn MemoryRepository>,
    embedder: Arc<Embedder>,
    similarity_floor: f32,
}

impl RelevanceRanker {
    pub fn new(repo: Arc<dyn MemoryRepository>, embedder: Arc<Embedder>, similarity_floor: f64) -> Self {
        Self {
            repo,
            embedder,
            similarity_floor: similarity_floor as f32,
        }
    }

    /// Rank context for `query_text`. At most `options.max_results` items, best first.
    pub async fn rank(
        &self,
        owner_id: &str,
        query_text: &str,
        options: &RankOptions,
        corpus: &[CorpusEntry],
    ) -> Vec<RetrievedItem> {
        self.rank_at(owner_id, query_text, options, corpus, Utc::now())
            .await
            .0
    }

    /// [`rank`](Self::rank) with an explicit clock, also reporting the path taken.
    pub async fn rank_at(
        &self,
        owner_id: &str,
        query_text: &str,
        options: &RankOptions,
        corpus: &[CorpusEntry],
        now: DateTime<Utc>,
    ) -> (Vec<RetrievedItem>, RankPath) {
        if options.max_results == 0 {
            return (Vec::new(), RankPath::Vector);
        }
        let keywords = query_keywords(query_text);

        let (mut items, path) = match self.vector_stage(owner_id, query_text, options, now).await {
            Ok(items) => (items, RankPath::Vector),
            Err(e) => {
                warn!(owner_id, error = %e, "vector retrieval failed, falling back to keywords");
                crate::metrics::record_retrieval_fallback();
                let items = match self.keyword_stage(owner_id, &keywords, options, now).await {
                    Ok(items) => items,
                    Err(e) => {
                        error!(owner_id, error = %e, "keyword fallback failed");
                        Vec::new()
                    }
                };
                (items, RankPath::KeywordFallback)
            }
        };

        items.extend(score_corpus(&keywords, corpus, now));
        let ranked = merge_and_truncate(items, options.max_results);
        info!(owner_id, count = ranked.len(), path = ?path, "retrieved memories");
        (ranked, path)
    }

    async fn vector_stage(
        &self,
        owner_id: &str,
        query_text: &str,
        options: &RankOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetrievedItem>, KeepsakeError> {
        let query = self.embedder.embed(query_text).await;
        if is_zero_vector(&query) {
            return Err(KeepsakeError::provider("query embedding unavailable"));
        }

        let candidates = self
            .repo
            .search_similar(
                owner_id,
                &query,
                options.max_results.saturating_mul(2),
                Some(self.similarity_floor),
            )
            .await?;
        debug!(owner_id, candidates = candidates.len(), "vector candidates fetched");

        Ok(candidates
            .into_iter()
            .filter_map(|c| {
                let tf = time_factor(
                    days_between(c.memory.happened_at, now),
                    options.time_decay_factor,
                );
                let score = combined_score(c.similarity as f64, tf);
                if score < options.min_relevance_score {
                    return None;
                }
                let content = c.memory.content.clone().unwrap_or_default();
                Some(item_from_memory(c.memory, content, score))
            })
            .collect())
    }

    async fn keyword_stage(
        &self,
        owner_id: &str,
        keywords: &BTreeSet<String>,
        options: &RankOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<RetrievedItem>, KeepsakeError> {
        let memories = self
            .repo
            .recent_active(owner_id, options.max_results.saturating_mul(3))
            .await?;
        Ok(score_memories_by_keyword(keywords, memories, options, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FaultyStore, StubEmbedder, memory_store};
    use crate::types::MemoryStatus;
    use chrono::{Duration, TimeZone};
    use tracing_test::traced_test;

    const OPTIONS: RankOptions = RankOptions {
        max_results: 5,
        time_decay_factor: 0.1,
        min_relevance_score: 0.35,
    };

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn memory(id: &str, content: &str, embedding: Vec<f32>, happened_at: DateTime<Utc>) -> Memory {
        Memory {
            id: id.into(),
            owner_id: "o1".into(),
            happened_at,
            source_type: "chat".into(),
            content: Some(content.into()),
            embedding: Some(embedding),
            content_hash: None,
            status: MemoryStatus::Active,
            sentiment_score: 2,
            extracted_facts: serde_json::json!({}),
            created_at: happened_at,
        }
    }

    #[test]
    fn time_factor_shape() {
        assert_eq!(time_factor(0.0, 0.1), 1.0);
        assert!((time_factor(10.0, 0.1) - 0.5).abs() < 1e-12);
        assert_eq!(time_factor(-3.0, 0.1), 1.0);
        assert_eq!(time_factor(1000.0, 0.0), 1.0);
    }

    #[test]
    fn combined_score_weights() {
        assert!((combined_score(0.9, 0.5) - 0.82).abs() < 1e-12);
        assert!((combined_score(0.7, 1.0) - 0.76).abs() < 1e-12);
    }

    #[test]
    fn keyword_scoring() {
        let kw = query_keywords("When did Coffee  coffee start?");
        assert_eq!(kw.len(), 4);
        assert_eq!(keyword_hits(&kw, "She started drinking COFFEE"), 1);
        assert_eq!(keyword_score(0), 0.05);
        assert!((keyword_score(2) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn corpus_entries_are_never_dropped() {
        let now = Utc::now();
        let corpus = vec![
            CorpusEntry::new("birthday is in May"),
            CorpusEntry::new("unrelated note"),
            CorpusEntry::new("   "),
        ];
        let items = score_corpus(&query_keywords("birthday"), &corpus, now);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.memory_id.is_none()));
        assert!(items.iter().all(|i| i.source_type == CORPUS_SOURCE_TYPE));
        assert!((items[0].relevance_score - 0.3).abs() < 1e-12);
        assert_eq!(items[1].relevance_score, 0.05);
    }

    #[test]
    fn merge_sorts_descending_and_truncates() {
        let now = Utc::now();
        let items: Vec<RetrievedItem> = [0.2, 0.9, 0.5]
            .into_iter()
            .map(|s| RetrievedItem {
                memory_id: None,
                content: s.to_string(),
                happened_at: now,
                source_type: CORPUS_SOURCE_TYPE.into(),
                sentiment_score: 0,
                relevance_score: s,
            })
            .collect();
        let merged = merge_and_truncate(items, 2);
        let scores: Vec<f64> = merged.iter().map(|i| i.relevance_score).collect();
        assert_eq!(scores, vec![0.9, 0.5]);
    }

    #[tokio::test]
    async fn vector_path_scores_and_orders() {
        let store = memory_store().await;
        let now = clock();
        store
            .insert(&memory("old", "met at the lake", vec![0.9, 0.435_889_9], now - Duration::days(10)))
            .await
            .unwrap();
        store
            .insert(&memory("new", "went hiking", vec![0.7, 0.714_142_8], now))
            .await
            .unwrap();
        store
            .insert(&memory("far", "unrelated", vec![0.0, 1.0], now))
            .await
            .unwrap();

        let embedder = Arc::new(Embedder::new(
            Arc::new(StubEmbedder::new(2).with("where did we meet", vec![1.0, 0.0])),
            2,
        ));
        let ranker = RelevanceRanker::new(Arc::new(store), embedder, 0.5);
        let (items, path) = ranker
            .rank_at("o1", "where did we meet", &OPTIONS, &[], now)
            .await;

        assert_eq!(path, RankPath::Vector);
        let ids: Vec<&str> = items.iter().filter_map(|i| i.memory_id.as_deref()).collect();
        assert_eq!(ids, vec!["old", "new"]);
        assert!((items[0].relevance_score - (0.9 * 0.8 + 0.5 * 0.2)).abs() < 1e-5);
        assert!((items[1].relevance_score - (0.7 * 0.8 + 1.0 * 0.2)).abs() < 1e-5);
        assert_eq!(items[0].sentiment_score, 2);
    }

    #[tokio::test]
    async fn relevance_floor_is_inclusive() {
        let store = memory_store().await;
        let now = clock();
        store
            .insert(&memory("edge", "x", vec![1.0, 0.0], now))
            .await
            .unwrap();
        let embedder = Arc::new(Embedder::new(
            Arc::new(StubEmbedder::new(2).with("q", vec![1.0, 0.0])),
            2,
        ));
        let ranker = RelevanceRanker::new(Arc::new(store), embedder, 0.5);

        let exact = RankOptions {
            min_relevance_score: combined_score(1.0, 1.0),
            ..OPTIONS
        };
        let (items, _) = ranker.rank_at("o1", "q", &exact, &[], now).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relevance_score, combined_score(1.0, 1.0));
    }

    #[tokio::test]
    async fn zero_query_vector_falls_back_to_keywords() {
        let store = memory_store().await;
        let now = clock();
        store
            .insert(&memory("m1", "her birthday party", vec![1.0, 0.0], now))
            .await
            .unwrap();
        let embedder = Arc::new(Embedder::new(Arc::new(StubEmbedder::new(2).failing()), 2));
        let ranker = RelevanceRanker::new(Arc::new(store), embedder, 0.5);

        let (items, path) = ranker
            .rank_at("o1", "birthday plans", &OPTIONS, &[], now)
            .await;
        assert_eq!(path, RankPath::KeywordFallback);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].memory_id.as_deref(), Some("m1"));
        assert!((items[0].relevance_score - 0.3).abs() < 1e-9);
    }

    #[traced_test]
    #[tokio::test]
    async fn search_failure_falls_back_with_same_shape() {
        let store = memory_store().await;
        let now = clock();
        store
            .insert(&memory("m1", "dinner at the lake", vec![1.0, 0.0], now - Duration::days(10)))
            .await
            .unwrap();
        store
            .insert(&memory("m2", "nothing relevant", vec![1.0, 0.0], now))
            .await
            .unwrap();
        let embedder = Arc::new(Embedder::new(Arc::new(StubEmbedder::new(2)), 2));
        let ranker = RelevanceRanker::new(Arc::new(FaultyStore::failing_search(store)), embedder, 0.5);

        let corpus = vec![CorpusEntry::new("the lake house")];
        let (items, path) = ranker
            .rank_at("o1", "lake dinner", &OPTIONS, &corpus, now)
            .await;
        assert_eq!(path, RankPath::KeywordFallback);
        // m1: two hits, ten days old -> 0.6 * 0.5; corpus: one hit -> 0.3;
        // m2: baseline 0.05 is below the floor.
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].memory_id.as_deref(), Some("m1"));
        assert!((items[0].relevance_score - 0.3).abs() < 1e-6);
        assert_eq!(items[1].source_type, CORPUS_SOURCE_TYPE);
        assert!(items[1].memory_id.is_none());
        assert!(logs_contain("falling back to keywords"));
    }

    #[tokio::test]
    async fn corpus_merges_with_vector_results_and_truncates() {
        let store = memory_store().await;
        let now = clock();
        store
            .insert(&memory("m1", "x", vec![1.0, 0.0], now))
            .await
            .unwrap();
        let embedder = Arc::new(Embedder::new(
            Arc::new(StubEmbedder::new(2).with("q", vec![1.0, 0.0])),
            2,
        ));
        let ranker = RelevanceRanker::new(Arc::new(store), embedder, 0.5);
        let corpus: Vec<CorpusEntry> = (0..5).map(|i| CorpusEntry::new(format!("note {i}"))).collect();
        let options = RankOptions {
            max_results: 3,
            ..OPTIONS
        };
        let (items, _) = ranker.rank_at("o1", "q", &options, &corpus, now).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].memory_id.as_deref(), Some("m1"));
        assert!(items[1..].iter().all(|i| i.relevance_score == 0.05));
    }
}
