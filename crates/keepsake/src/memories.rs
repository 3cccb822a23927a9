// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory management subcommands: ingest, timeline, similar, backfill.

use std::sync::Arc;

use keepsake_config::KeepsakeConfig;
use keepsake_core::KeepsakeError;
use keepsake_memory::{IngestOutcome, Memory, MemoryEngine, MemoryRepository, MemoryStore, NewMemory};
use keepsake_openai::OpenAiProvider;
use keepsake_storage::Database;
use tracing::info;

/// Open the database and wire the engine to the configured remote provider.
pub async fn open_engine(config: &KeepsakeConfig) -> Result<MemoryEngine, KeepsakeError> {
    let store = open_store(config).await?;
    let provider = Arc::new(OpenAiProvider::new(&config.llm)?);
    Ok(MemoryEngine::new(
        config,
        Arc::new(store),
        provider.clone(),
        provider,
    ))
}

async fn open_store(config: &KeepsakeConfig) -> Result<MemoryStore, KeepsakeError> {
    let db = Database::from_config(&config.storage).await?;
    info!(path = %config.storage.database_path, "database opened");
    Ok(MemoryStore::from_database(&db))
}

pub fn describe_outcome(outcome: &IngestOutcome) -> String {
    match outcome {
        IngestOutcome::Created { memory, replaced } => match replaced {
            Some(s) => format!(
                "created {} (replaces {}: \"{}\")",
                memory.id, s.replaced_memory_id, s.replaced_content
            ),
            None => format!("created {}", memory.id),
        },
        IngestOutcome::SkippedHash { hash } => format!("skipped: fingerprint {hash} already stored"),
        IngestOutcome::SkippedDuplicate {
            matched_id,
            similarity,
        } => format!("skipped: duplicate of {matched_id} (similarity {similarity:.3})"),
    }
}

pub fn format_memory_line(memory: &Memory) -> String {
    format!(
        "{}  {}  [{}] {:<8} {:+3}  {}",
        memory.happened_at.format("%Y-%m-%d %H:%M"),
        memory.id,
        memory.status.as_str(),
        memory.source_type,
        memory.sentiment_score,
        memory.content.as_deref().unwrap_or("<no text>")
    )
}

pub async fn run_ingest(config: &KeepsakeConfig, owner: &str, new: NewMemory) -> Result<(), KeepsakeError> {
    let engine = open_engine(config).await?;
    let outcome = engine.ingest(owner, new).await?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

pub async fn run_timeline(
    config: &KeepsakeConfig,
    owner: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<(), KeepsakeError> {
    let store = open_store(config).await?;
    let memories = store.timeline(owner, limit).await?;
    if json {
        let rendered = serde_json::to_string_pretty(&memories)
            .map_err(|e| KeepsakeError::Internal(format!("failed to render timeline: {e}")))?;
        println!("{rendered}");
    } else if memories.is_empty() {
        println!("no memories for {owner}");
    } else {
        for memory in &memories {
            println!("{}", format_memory_line(memory));
        }
    }
    Ok(())
}

pub async fn run_similar(config: &KeepsakeConfig, owner: &str, content: &str) -> Result<(), KeepsakeError> {
    let engine = open_engine(config).await?;
    let similar = engine.find_similar(owner, content).await;
    if similar.is_empty() {
        println!("no similar memories");
    }
    for entry in similar {
        println!("{:.3}  {}  {}", entry.similarity, entry.id, entry.content);
    }
    Ok(())
}

pub async fn run_backfill(config: &KeepsakeConfig, batch_size: usize) -> Result<(), KeepsakeError> {
    let engine = open_engine(config).await?;
    let report = engine.backfill(batch_size).await?;
    println!(
        "backfill: {} embedded, {} failed",
        report.processed, report.failed
    );
    Ok(())
}
