// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed memory store and in-process vector similarity index.
//!
//! Embeddings are stored as little-endian f32 BLOBs. Similarity search
//! loads the owner's active rows and scores them with cosine similarity;
//! rows whose dimension differs from the query are skipped.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use keepsake_core::KeepsakeError;
use keepsake_storage::Database;
use rusqlite::types::Type;
use tokio_rusqlite::Connection;

use crate::types::{Memory, MemoryStatus, SimilarMemory, blob_to_vec, cosine_similarity, vec_to_blob};

const MEMORY_COLUMNS: &str = "id, owner_id, happened_at, source_type, content, embedding, \
     content_hash, status, sentiment_score, extracted_facts, created_at";

/// SQLite treats a negative LIMIT as unbounded.
const UNBOUNDED: i64 = -1;

fn storage_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KeepsakeError {
    KeepsakeError::Storage {
        source: Box::new(e),
    }
}

/// Persistence and similarity-search operations the engine needs.
///
/// Every read that feeds retrieval, dedup or conflict detection is scoped
/// to one owner and restricted to `active` records.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Insert a new record.
    async fn insert(&self, memory: &Memory) -> Result<(), KeepsakeError>;

    /// Atomically mark `replaced_id` outdated and insert `memory`.
    ///
    /// Returns `Ok(false)` without writing anything when `replaced_id` is no
    /// longer active. On error neither change is applied.
    async fn insert_superseding(
        &self,
        memory: &Memory,
        replaced_id: &str,
    ) -> Result<bool, KeepsakeError>;

    /// Fetch any record by id, regardless of status.
    async fn get(&self, id: &str) -> Result<Option<Memory>, KeepsakeError>;

    /// Active records of `owner_id` with content and an embedding, ordered by
    /// similarity to `query` descending, at most `limit` of them.
    ///
    /// Ties keep insertion order.
    async fn search_similar(
        &self,
        owner_id: &str,
        query: &[f32],
        limit: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<SimilarMemory>, KeepsakeError>;

    /// The single nearest active record, if any.
    async fn nearest(
        &self,
        owner_id: &str,
        query: &[f32],
    ) -> Result<Option<SimilarMemory>, KeepsakeError> {
        Ok(self
            .search_similar(owner_id, query, 1, None)
            .await?
            .into_iter()
            .next())
    }

    /// Flip an active record to `outdated`. Returns false if it was not active.
    async fn mark_outdated(&self, id: &str) -> Result<bool, KeepsakeError>;

    /// Any record of `owner_id` (any status) carrying `hash`.
    async fn find_by_content_hash(
        &self,
        owner_id: &str,
        hash: &str,
    ) -> Result<Option<Memory>, KeepsakeError>;

    /// Most recent active records with content, by `happened_at` descending.
    async fn recent_active(&self, owner_id: &str, limit: usize)
    -> Result<Vec<Memory>, KeepsakeError>;

    /// All records of `owner_id`, any status, by `happened_at` descending.
    async fn timeline(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>, KeepsakeError>;

    /// `(id, content)` of active records that have content but no embedding.
    async fn missing_embeddings(&self) -> Result<Vec<(String, String)>, KeepsakeError>;

    /// Store an embedding for an existing record.
    async fn set_embedding(&self, id: &str, embedding: &[f32]) -> Result<(), KeepsakeError>;
}

/// SQLite implementation of [`MemoryRepository`].
#[derive(Clone)]
pub struct MemoryStore {
    conn: Connection,
}

impl MemoryStore {
    /// Wrap a connection that already has the `memories` migration applied.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(db.connection().clone())
    }

    /// Number of active records for an owner.
    pub async fn count_active(&self, owner_id: &str) -> Result<usize, KeepsakeError> {
        let owner_id = owner_id.to_string();
        self.conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE owner_id = ?1 AND status = 'active'",
                    rusqlite::params![owner_id],
                    |row| row.get(0),
                )?;
                Ok(n as usize)
            })
            .await
            .map_err(storage_err)
    }

    /// Run `SELECT <columns> FROM memories <sql_tail>` binding `?1 = owner_id`, `?2 = limit`.
    async fn query_memories(
        &self,
        sql_tail: &'static str,
        owner_id: &str,
        limit: i64,
    ) -> Result<Vec<Memory>, KeepsakeError> {
        let owner_id = owner_id.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Memory>, rusqlite::Error> {
                let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories {sql_tail}");
                let mut stmt = conn.prepare(&sql)?;
                let memories = stmt
                    .query_map(rusqlite::params![owner_id, limit], row_to_memory)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(memories)
            })
            .await
            .map_err(storage_err)
    }
}

#[async_trait]
impl MemoryRepository for MemoryStore {
    async fn insert(&self, memory: &Memory) -> Result<(), KeepsakeError> {
        let row = MemoryRow::from(memory);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> { row.insert(conn) })
            .await
            .map_err(storage_err)
    }

    async fn insert_superseding(
        &self,
        memory: &Memory,
        replaced_id: &str,
    ) -> Result<bool, KeepsakeError> {
        let row = MemoryRow::from(memory);
        let replaced_id = replaced_id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE memories SET status = 'outdated' WHERE id = ?1 AND status = 'active'",
                    rusqlite::params![replaced_id],
                )?;
                if changed == 0 {
                    // dropping the transaction rolls it back
                    return Ok(false);
                }
                row.insert(&tx)?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(storage_err)
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, KeepsakeError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Memory>, rusqlite::Error> {
                let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                match stmt.query_row(rusqlite::params![id], row_to_memory) {
                    Ok(memory) => Ok(Some(memory)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(storage_err)
    }

    async fn search_similar(
        &self,
        owner_id: &str,
        query: &[f32],
        limit: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<SimilarMemory>, KeepsakeError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = self
            .query_memories(
                "WHERE owner_id = ?1 AND status = 'active' AND content IS NOT NULL \
                 AND embedding IS NOT NULL ORDER BY created_at, rowid LIMIT ?2",
                owner_id,
                UNBOUNDED,
            )
            .await?;

        let mut scored: Vec<SimilarMemory> = candidates
            .into_iter()
            .filter_map(|memory| {
                let embedding = memory.embedding.as_deref()?;
                if embedding.len() != query.len() {
                    return None;
                }
                let similarity = cosine_similarity(query, embedding);
                if min_similarity.is_some_and(|min| similarity < min) {
                    return None;
                }
                Some(SimilarMemory { memory, similarity })
            })
            .collect();

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn mark_outdated(&self, id: &str) -> Result<bool, KeepsakeError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let changed = conn.execute(
                    "UPDATE memories SET status = 'outdated' WHERE id = ?1 AND status = 'active'",
                    rusqlite::params![id],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(storage_err)
    }

    async fn find_by_content_hash(
        &self,
        owner_id: &str,
        hash: &str,
    ) -> Result<Option<Memory>, KeepsakeError> {
        let owner_id = owner_id.to_string();
        let hash = hash.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Memory>, rusqlite::Error> {
                let sql = format!(
                    "SELECT {MEMORY_COLUMNS} FROM memories WHERE owner_id = ?1 AND content_hash = ?2 LIMIT 1"
                );
                let mut stmt = conn.prepare(&sql)?;
                match stmt.query_row(rusqlite::params![owner_id, hash], row_to_memory) {
                    Ok(memory) => Ok(Some(memory)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(storage_err)
    }

    async fn recent_active(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<Memory>, KeepsakeError> {
        self.query_memories(
            "WHERE owner_id = ?1 AND status = 'active' AND content IS NOT NULL \
             ORDER BY happened_at DESC LIMIT ?2",
            owner_id,
            limit as i64,
        )
        .await
    }

    async fn timeline(
        &self,
        owner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>, KeepsakeError> {
        let limit = limit.map(|l| l as i64).unwrap_or(UNBOUNDED);
        self.query_memories(
            "WHERE owner_id = ?1 ORDER BY happened_at DESC LIMIT ?2",
            owner_id,
            limit,
        )
        .await
    }

    async fn missing_embeddings(&self) -> Result<Vec<(String, String)>, KeepsakeError> {
        self.conn
            .call(move |conn| -> Result<Vec<(String, String)>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, content FROM memories WHERE embedding IS NULL AND content IS NOT NULL AND TRIM(content) != '' AND status = 'active' ORDER BY created_at, rowid",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(storage_err)
    }

    async fn set_embedding(&self, id: &str, embedding: &[f32]) -> Result<(), KeepsakeError> {
        let id = id.to_string();
        let blob = vec_to_blob(embedding);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE memories SET embedding = ?1 WHERE id = ?2",
                    rusqlite::params![blob, id],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }
}

/// Owned column values of one `memories` row, ready to move into `call`.
struct MemoryRow {
    id: String,
    owner_id: String,
    happened_at: String,
    source_type: String,
    content: Option<String>,
    embedding: Option<Vec<u8>>,
    content_hash: Option<String>,
    status: &'static str,
    sentiment_score: i32,
    extracted_facts: String,
    created_at: String,
}

impl From<&Memory> for MemoryRow {
    fn from(memory: &Memory) -> Self {
        Self {
            id: memory.id.clone(),
            owner_id: memory.owner_id.clone(),
            happened_at: format_ts(&memory.happened_at),
            source_type: memory.source_type.clone(),
            content: memory.content.clone(),
            embedding: memory.embedding.as_deref().map(vec_to_blob),
            content_hash: memory.content_hash.clone(),
            status: memory.status.as_str(),
            sentiment_score: memory.sentiment_score,
            extracted_facts: memory.extracted_facts.to_string(),
            created_at: format_ts(&memory.created_at),
        }
    }
}

impl MemoryRow {
    fn insert(&self, conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO memories (id, owner_id, happened_at, source_type, content, embedding, content_hash, status, sentiment_score, extracted_facts, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                self.id,
                self.owner_id,
                self.happened_at,
                self.source_type,
                self.content,
                self.embedding,
                self.content_hash,
                self.status,
                self.sentiment_score,
                self.extracted_facts,
                self.created_at
            ],
        )?;
        Ok(())
    }
}

/// Timestamps are stored as fixed-width RFC 3339 UTC so text order is time order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_memory(row: &rusqlite::Row) -> Result<Memory, rusqlite::Error> {
    let happened_at: String = row.get(2)?;
    let embedding: Option<Vec<u8>> = row.get(5)?;
    let status: String = row.get(7)?;
    let facts: String = row.get(9)?;
    let created_at: String = row.get(10)?;

    Ok(Memory {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        happened_at: parse_ts(2, &happened_at)?,
        source_type: row.get(3)?,
        content: row.get(4)?,
        embedding: embedding.map(|b| blob_to_vec(&b)),
        content_hash: row.get(6)?,
        status: MemoryStatus::from_str_value(&status),
        sentiment_score: row.get(8)?,
        extracted_facts: serde_json::from_str(&facts).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
        })?,
        created_at: parse_ts(10, &created_at)?,
    })
}
