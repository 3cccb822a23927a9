// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the memory pipeline.
//!
//! Each test creates an isolated TestHarness with a temp SQLite database
//! and mock adapters. Tests are independent and order-insensitive.

use chrono::{Duration, Utc};
use keepsake_memory::{
    CorpusEntry, IngestOutcome, MemoryRepository, MemoryStatus, NewMemory, RankOptions, Stage,
};
use keepsake_test_utils::TestHarness;

const OWNER: &str = "owner-1";

async fn harness_3d() -> TestHarness {
    TestHarness::builder().with_dimensions(3).build().await.unwrap()
}

// ---- Deduplication ----

#[tokio::test]
async fn same_content_twice_keeps_one_active_record() {
    let harness = harness_3d().await;

    let first = harness.remember(OWNER, "She loves jazz").await.unwrap();
    let first_id = first.created().unwrap().id.clone();
    let second = harness.remember(OWNER, "She loves jazz").await.unwrap();

    match second {
        IngestOutcome::SkippedDuplicate {
            matched_id,
            similarity,
        } => {
            assert_eq!(matched_id, first_id);
            assert!(similarity >= 0.92, "similarity {similarity}");
        }
        other => panic!("expected duplicate, got {other:?}"),
    }
    assert_eq!(harness.active_count(OWNER).await.unwrap(), 1);
}

#[tokio::test]
async fn duplicates_are_scoped_per_owner() {
    let harness = harness_3d().await;
    harness.remember("a", "She loves jazz").await.unwrap();
    let other = harness.remember("b", "She loves jazz").await.unwrap();
    assert!(other.created().is_some());
}

// ---- Conflict resolution ----

#[tokio::test]
async fn contradicting_fact_supersedes_the_old_one() {
    let harness = TestHarness::builder()
        .with_dimensions(3)
        .with_vector("She likes coffee", vec![1.0, 0.0, 0.0])
        .with_vector("She doesn't like coffee", vec![0.8, 0.6, 0.0])
        .with_mock_responses(vec!["yes".into()])
        .build()
        .await
        .unwrap();

    let a = harness.remember(OWNER, "She likes coffee").await.unwrap();
    let a_id = a.created().unwrap().id.clone();
    let b = harness.remember(OWNER, "She doesn't like coffee").await.unwrap();

    let IngestOutcome::Created { memory, replaced } = b else {
        panic!("expected created, got {b:?}");
    };
    assert_eq!(replaced.unwrap().replaced_memory_id, a_id);
    assert_eq!(memory.replaced_memory_id(), Some(a_id.as_str()));

    let old = harness.store.get(&a_id).await.unwrap().unwrap();
    assert_eq!(old.status, MemoryStatus::Outdated);
    assert_eq!(harness.active_count(OWNER).await.unwrap(), 1);

    // outdated records stay in the timeline
    let timeline = harness.engine.timeline(OWNER, None).await.unwrap();
    assert_eq!(timeline.len(), 2);
}

#[tokio::test]
async fn unrelated_similar_facts_both_stay_active() {
    let harness = TestHarness::builder()
        .with_dimensions(3)
        .with_vector("She likes films", vec![1.0, 0.0, 0.0])
        .with_vector("She likes coffee", vec![0.8, 0.6, 0.0])
        .with_mock_responses(vec!["no".into()])
        .build()
        .await
        .unwrap();

    harness.remember(OWNER, "She likes films").await.unwrap();
    let second = harness.remember(OWNER, "She likes coffee").await.unwrap();

    let IngestOutcome::Created { replaced, .. } = second else {
        panic!("expected created");
    };
    assert!(replaced.is_none());
    assert_eq!(harness.active_count(OWNER).await.unwrap(), 2);
    assert_eq!(harness.mock_provider.request_count().await, 1);
}

#[tokio::test]
async fn adjudicator_outage_means_no_conflict() {
    let harness = TestHarness::builder()
        .with_dimensions(3)
        .with_vector("lives in Berlin", vec![1.0, 0.0, 0.0])
        .with_vector("moved to Lisbon", vec![0.8, 0.6, 0.0])
        .build()
        .await
        .unwrap();
    harness.remember(OWNER, "lives in Berlin").await.unwrap();
    harness.mock_provider.add_failure("down").await;

    let outcome = harness.remember(OWNER, "moved to Lisbon").await.unwrap();
    assert!(outcome.created().is_some());
    assert_eq!(harness.active_count(OWNER).await.unwrap(), 2);
}

// ---- Ranking ----

#[tokio::test]
async fn ranking_follows_similarity_and_recency_weights() {
    let harness = TestHarness::builder()
        .with_dimensions(3)
        .with_vector("where did we meet", vec![1.0, 0.0, 0.0])
        .with_vector("met at the lake", vec![0.9, 0.435_889_9, 0.0])
        .with_vector("went hiking", vec![0.7, 0.0, 0.714_142_8])
        .build()
        .await
        .unwrap();

    let now = Utc::now();
    harness
        .engine
        .ingest(OWNER, NewMemory::text("met at the lake").happened_at(now - Duration::days(10)))
        .await
        .unwrap();
    harness
        .engine
        .ingest(OWNER, NewMemory::text("went hiking").happened_at(now))
        .await
        .unwrap();

    let options = RankOptions {
        max_results: 5,
        time_decay_factor: 0.1,
        min_relevance_score: 0.35,
    };
    let items = harness
        .engine
        .rank(OWNER, "where did we meet", &options, &[])
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].content, "met at the lake");
    assert_eq!(items[1].content, "went hiking");
    assert!((items[0].relevance_score - (0.9 * 0.8 + 0.5 * 0.2)).abs() < 1e-4);
    assert!((items[1].relevance_score - (0.7 * 0.8 + 1.0 * 0.2)).abs() < 1e-4);
}

#[tokio::test]
async fn score_equal_to_threshold_is_included() {
    let harness = TestHarness::builder()
        .with_dimensions(3)
        .with_vector("q", vec![1.0, 0.0, 0.0])
        .with_vector("exact match", vec![1.0, 0.0, 0.0])
        .build()
        .await
        .unwrap();
    harness.remember(OWNER, "exact match").await.unwrap();

    // no decay: similarity 1.0 scores exactly 0.8 + 0.2
    let options = RankOptions {
        max_results: 5,
        time_decay_factor: 0.0,
        min_relevance_score: 1.0 * 0.8 + 1.0 * 0.2,
    };
    let items = harness.engine.rank(OWNER, "q", &options, &[]).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].relevance_score, options.min_relevance_score);
}

#[tokio::test]
async fn keyword_fallback_returns_same_item_shape() {
    let harness = harness_3d().await;
    harness.remember(OWNER, "dinner at the lake house").await.unwrap();
    harness.mock_embedder.set_failing(true);

    let options = harness.engine.rank_options();
    let items = harness
        .engine
        .rank(OWNER, "lake", &options, &[CorpusEntry::new("unrelated")])
        .await;

    assert!(!items.is_empty());
    assert_eq!(items[0].content, "dinner at the lake house");
    assert!(items[0].memory_id.is_some());
    assert_eq!(items[0].source_type, "chat");
    assert!(items[0].relevance_score > 0.29);
    // corpus entries ride along with the baseline score
    assert!(items.iter().any(|i| i.memory_id.is_none() && i.source_type == "corpus"));
}

#[tokio::test]
async fn outdated_and_foreign_records_are_never_retrieved() {
    let harness = TestHarness::builder()
        .with_dimensions(3)
        .with_vector("q", vec![1.0, 0.0, 0.0])
        .with_vector("old fact", vec![1.0, 0.0, 0.0])
        .build()
        .await
        .unwrap();
    let old = harness.remember(OWNER, "old fact").await.unwrap();
    harness.remember("someone-else", "old fact").await.unwrap();
    harness
        .store
        .mark_outdated(&old.created().unwrap().id)
        .await
        .unwrap();

    let items = harness
        .engine
        .rank(OWNER, "q", &harness.engine.rank_options(), &[])
        .await;
    assert!(items.is_empty());
}

// ---- Routing ----

#[tokio::test]
async fn malformed_router_output_skips_retrieval() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec!["I think you should retrieve".into()])
        .build()
        .await
        .unwrap();
    let decision = harness.engine.route("when is her birthday?", "Alex").await;
    assert!(!decision.needs_retrieval());
}

// ---- Zero-vector short-circuit ----

#[tokio::test]
async fn empty_content_never_matches() {
    let harness = harness_3d().await;
    harness.remember(OWNER, "anything at all").await.unwrap();
    let before = harness.mock_provider.request_count().await;

    let check = harness.engine.check_duplicate(OWNER, "").await;
    assert!(!check.is_duplicate);
    assert!(harness.engine.resolve_conflict(OWNER, "   ").await.is_none());
    assert!(harness.engine.find_similar(OWNER, "").await.is_empty());
    assert_eq!(harness.mock_provider.request_count().await, before);
}

// ---- Full turns ----

#[tokio::test]
async fn retrieval_turn_uses_stored_memories() {
    let harness = TestHarness::builder()
        .with_dimensions(3)
        .with_vector("we first met at the lake", vec![1.0, 0.0, 0.0])
        .with_vector("when did we first meet?", vec![0.95, 0.312_25, 0.0])
        .with_mock_responses(vec![
            r#"{"route": "memory_rag", "reasoning": "asks about a past event"}"#.into(),
            "At the lake.".into(),
        ])
        .build()
        .await
        .unwrap();
    harness.remember(OWNER, "we first met at the lake").await.unwrap();

    let outcome = harness.chat(OWNER, "Alex", "when did we first meet?").await;

    assert_eq!(outcome.reply, "At the lake.");
    assert!(outcome.route.needs_retrieval());
    assert_eq!(outcome.retrieved.len(), 1);
    assert_eq!(outcome.stages, vec![Stage::Route, Stage::Retrieve, Stage::Generate, Stage::Done]);

    let requests = harness.mock_provider.requests().await;
    let system = &requests[1].messages[0].content;
    assert!(system.contains("we first met at the lake"), "system prompt: {system}");
}

#[tokio::test]
async fn event_report_is_extracted_and_committed() {
    let harness = TestHarness::builder()
        .with_dimensions(3)
        .with_mock_responses(vec![
            r#"{"route": "mentor_chat"}"#.into(),
            "That must have felt good.".into(),
            r#"{"has_new_fact": true, "content_summary": "Alex got promoted", "sentiment": "positive", "sentiment_score": 7, "topics": ["work"]}"#.into(),
        ])
        .build()
        .await
        .unwrap();

    let outcome = harness
        .chat(OWNER, "Alex", "She told me today that she got promoted")
        .await;

    assert_eq!(outcome.stages.last(), Some(&Stage::Done));
    assert!(outcome.stages.contains(&Stage::Extract));
    let memory = outcome.extracted.as_ref().and_then(|o| o.created()).unwrap();
    assert_eq!(memory.content.as_deref(), Some("Alex got promoted"));
    assert_eq!(memory.sentiment_score, 7);
    assert_eq!(memory.extracted_facts["topics"][0], "work");
    assert_eq!(harness.active_count(OWNER).await.unwrap(), 1);
}

#[tokio::test]
async fn total_outage_still_finishes_the_turn() {
    let harness = harness_3d().await;
    harness.mock_embedder.set_failing(true);
    harness.mock_provider.add_failure("router down").await;
    harness.mock_provider.add_failure("generator down").await;

    let outcome = harness.chat(OWNER, "Alex", "what happened yesterday?").await;
    assert_eq!(outcome.reply, keepsake_memory::generator::APOLOGY);
    assert!(outcome.retrieved.is_empty());
    assert!(outcome.extracted.is_none());
    assert_eq!(outcome.stages, vec![Stage::Route, Stage::Generate, Stage::Done]);
}

#[tokio::test]
async fn backfill_embeds_records_stored_during_an_outage() {
    let harness = harness_3d().await;
    harness.mock_embedder.set_failing(true);
    harness.remember(OWNER, "first").await.unwrap();
    harness.remember(OWNER, "second").await.unwrap();
    assert_eq!(harness.store.missing_embeddings().await.unwrap().len(), 2);

    harness.mock_embedder.set_failing(false);
    let report = harness.engine.backfill(50).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 0);
    assert!(harness.store.missing_embeddings().await.unwrap().is_empty());
}
