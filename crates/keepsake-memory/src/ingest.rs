// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Commit pipeline for new memories.
//!
//! Order: fingerprint hash fast path, embedding, duplicate gate, conflict
//! detection, insert. A confirmed conflict is outdated in the same
//! transaction as the insert. The sequence runs under a per-owner lock so two
//! concurrent ingestions for one owner cannot both supersede the same
//! record or miss each other's insert. The lock is process-local.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use keepsake_core::KeepsakeError;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conflict::ConflictResolver;
use crate::dedup::DedupGate;
use crate::embedder::Embedder;
use crate::store::MemoryRepository;
use crate::types::{
    IngestOutcome, Memory, MemoryStatus, NewMemory, REPLACED_MEMORY_ID_KEY, SENTIMENT_RANGE,
    SimilarMemory, Supersession, content_hash, is_zero_vector,
};

pub struct MemoryIngestor {
    repo: Arc<dyn MemoryRepository>,
    embedder: Arc<Embedder>,
    dedup: Arc<DedupGate>,
    resolver: Arc<ConflictResolver>,
    owner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryIngestor {
    pub fn new(
        repo: Arc<dyn MemoryRepository>,
        embedder: Arc<Embedder>,
        dedup: Arc<DedupGate>,
        resolver: Arc<ConflictResolver>,
    ) -> Self {
        Self {
            repo,
            embedder,
            dedup,
            resolver,
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn owner_lock(&self, owner_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().await;
        locks
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the owner's lock once no other ingestion holds or awaits it.
    async fn release_owner_lock(&self, owner_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.owner_locks.lock().await;
        // one reference in the map, one in `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(owner_id);
        }
    }

    /// Commit `new` for `owner_id` unless it is already known.
    ///
    /// Only a storage failure on insert is returned as an error; every other
    /// collaborator failure degrades to "not duplicate" / "no conflict".
    /// A supersession and the insert that causes it are applied atomically.
    pub async fn ingest(&self, owner_id: &str, new: NewMemory) -> Result<IngestOutcome, KeepsakeError> {
        let lock = self.owner_lock(owner_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.ingest_locked(owner_id, new).await
        };
        self.release_owner_lock(owner_id, lock).await;
        outcome
    }

    async fn ingest_locked(
        &self,
        owner_id: &str,
        new: NewMemory,
    ) -> Result<IngestOutcome, KeepsakeError> {
        let hash = new.fingerprint.as_deref().map(content_hash);
        if let Some(hash) = &hash {
            match self.repo.find_by_content_hash(owner_id, hash).await {
                Ok(Some(existing)) => {
                    debug!(owner_id, memory_id = %existing.id, "fingerprint already ingested");
                    return Ok(IngestOutcome::SkippedHash { hash: hash.clone() });
                }
                Ok(None) => {}
                Err(e) => warn!(owner_id, error = %e, "content hash lookup failed, continuing"),
            }
        }

        let mut facts = match new.extracted_facts {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut embedding = None;
        let mut conflict = None;

        if let Some(text) = new.content.as_deref().filter(|t| !t.trim().is_empty()) {
            let vector = self.embedder.embed(text).await;

            let check = self.dedup.check(owner_id, text, Some(&vector)).await;
            if let (true, Some(matched_id), Some(similarity)) =
                (check.is_duplicate, check.matched_id, check.similarity)
            {
                crate::metrics::record_dedup_hit();
                info!(owner_id, matched_id = %matched_id, similarity, "skipping duplicate memory");
                return Ok(IngestOutcome::SkippedDuplicate {
                    matched_id,
                    similarity,
                });
            }

            conflict = self.resolver.detect(owner_id, text, Some(&vector)).await;
            if let Some(candidate) = &conflict {
                facts.insert(
                    REPLACED_MEMORY_ID_KEY.to_string(),
                    Value::String(candidate.memory.id.clone()),
                );
            }

            if !is_zero_vector(&vector) {
                embedding = Some(vector);
            }
        }

        let mut memory = Memory {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            happened_at: new.happened_at,
            source_type: new.source_type,
            content: new.content,
            embedding,
            content_hash: hash,
            status: MemoryStatus::Active,
            sentiment_score: new
                .sentiment_score
                .clamp(*SENTIMENT_RANGE.start(), *SENTIMENT_RANGE.end()),
            extracted_facts: Value::Object(facts),
            created_at: Utc::now(),
        };

        let replaced = match conflict {
            Some(candidate) => self.commit_superseding(&mut memory, candidate).await?,
            None => {
                self.repo.insert(&memory).await?;
                None
            }
        };

        crate::metrics::record_memory_created(&memory.source_type);
        info!(
            owner_id,
            memory_id = %memory.id,
            replaced = ?replaced.as_ref().map(|s| s.replaced_memory_id.as_str()),
            "memory created"
        );
        Ok(IngestOutcome::Created { memory, replaced })
    }

    /// Insert `memory` while outdating the confirmed conflict in one step.
    ///
    /// If the target stopped being active since detection, `memory` is
    /// inserted on its own without the replacement link.
    async fn commit_superseding(
        &self,
        memory: &mut Memory,
        candidate: SimilarMemory,
    ) -> Result<Option<Supersession>, KeepsakeError> {
        let replaced_id = candidate.memory.id;
        if self.repo.insert_superseding(memory, &replaced_id).await? {
            crate::metrics::record_supersession();
            info!(
                owner_id = %memory.owner_id,
                memory_id = %replaced_id,
                similarity = candidate.similarity,
                "memory marked outdated"
            );
            return Ok(Some(Supersession {
                replaced_memory_id: replaced_id,
                replaced_content: candidate.memory.content.unwrap_or_default(),
                similarity: candidate.similarity,
            }));
        }

        warn!(
            owner_id = %memory.owner_id,
            memory_id = %replaced_id,
            "conflict target no longer active"
        );
        if let Value::Object(facts) = &mut memory.extracted_facts {
            facts.remove(REPLACED_MEMORY_ID_KEY);
        }
        self.repo.insert(memory).await?;
        Ok(None)
    }
}
