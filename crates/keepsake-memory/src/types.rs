// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types and vector helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// `source_type` of ranked items that come from the auxiliary corpus.
pub const CORPUS_SOURCE_TYPE: &str = "corpus";

/// `source_type` of memories created by fact extraction.
pub const CHAT_SOURCE_TYPE: &str = "chat";

/// Key in `extracted_facts` pointing at the record a memory superseded.
pub const REPLACED_MEMORY_ID_KEY: &str = "replaced_memory_id";

/// Sentiment scores are clamped into this range before storage.
pub const SENTIMENT_RANGE: std::ops::RangeInclusive<i32> = -10..=10;

/// A timestamped fact about a tracked person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    /// The tracked entity this memory belongs to. All matching is scoped to it.
    pub owner_id: String,
    /// When the described event happened (not when the row was created).
    pub happened_at: DateTime<Utc>,
    pub source_type: String,
    /// Free-text summary. `None` for non-text sources.
    pub content: Option<String>,
    /// Embedding of `content`. `None` when content is blank or embedding failed.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// SHA-256 hex of the ingestion fingerprint, if one was supplied.
    pub content_hash: Option<String>,
    pub status: MemoryStatus,
    /// Integer in [-10, 10].
    pub sentiment_score: i32,
    /// Structured side metadata (JSON object).
    pub extracted_facts: Value,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    /// The id of the record this memory superseded, if any.
    pub fn replaced_memory_id(&self) -> Option<&str> {
        self.extracted_facts
            .get(REPLACED_MEMORY_ID_KEY)
            .and_then(Value::as_str)
    }

    /// Content with surrounding whitespace removed, or `None` if blank.
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Lifecycle status of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    /// Available for retrieval, dedup and conflict matching.
    Active,
    /// Superseded by a newer record. Retained for audit, excluded from matching.
    Outdated,
}

impl MemoryStatus {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Outdated => "outdated",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "outdated" => MemoryStatus::Outdated,
            _ => MemoryStatus::Active,
        }
    }
}

/// A memory proposed for ingestion.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: Option<String>,
    pub happened_at: DateTime<Utc>,
    pub source_type: String,
    pub sentiment_score: i32,
    /// Must be a JSON object; anything else is replaced by an empty object.
    pub extracted_facts: Value,
    /// Conversation fingerprint for the exact-match fast path.
    pub fingerprint: Option<String>,
}

impl NewMemory {
    /// A text memory that happened now, with neutral sentiment.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            happened_at: Utc::now(),
            source_type: CHAT_SOURCE_TYPE.to_string(),
            sentiment_score: 0,
            extracted_facts: Value::Object(Map::new()),
            fingerprint: None,
        }
    }

    pub fn happened_at(mut self, happened_at: DateTime<Utc>) -> Self {
        self.happened_at = happened_at;
        self
    }

    pub fn source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    pub fn sentiment(mut self, score: i32) -> Self {
        self.sentiment_score = score;
        self
    }

    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn facts(mut self, facts: Value) -> Self {
        self.extracted_facts = facts;
        self
    }
}

/// A record returned by the vector index together with its similarity.
#[derive(Debug, Clone)]
pub struct SimilarMemory {
    pub memory: Memory,
    /// `1 - cosine_distance`.
    pub similarity: f32,
}

/// One item of ranked context handed to generation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedItem {
    /// `None` for auxiliary-corpus entries.
    pub memory_id: Option<String>,
    pub content: String,
    pub happened_at: DateTime<Utc>,
    pub source_type: String,
    pub sentiment_score: i32,
    pub relevance_score: f64,
}

/// A free-text entry not backed by a stored memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub content: String,
}

impl CorpusEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Verdict of the deduplication gate.
///
/// `matched_id` and `similarity` describe the nearest active record and
/// are reported whether or not it counts as a duplicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub matched_id: Option<String>,
    pub similarity: Option<f32>,
}

impl DuplicateCheck {
    pub fn not_duplicate() -> Self {
        Self::default()
    }
}

/// Record of an existing memory being marked outdated by a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Supersession {
    pub replaced_memory_id: String,
    pub replaced_content: String,
    pub similarity: f32,
}

/// Result of a single ingestion.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// A new active record was stored.
    Created {
        memory: Memory,
        replaced: Option<Supersession>,
    },
    /// A record with the same fingerprint hash already exists for the owner.
    SkippedHash { hash: String },
    /// The nearest active record is at or above the dedup threshold.
    SkippedDuplicate { matched_id: String, similarity: f32 },
}

impl IngestOutcome {
    pub fn created(&self) -> Option<&Memory> {
        match self {
            IngestOutcome::Created { memory, .. } => Some(memory),
            _ => None,
        }
    }
}

/// Counts from an embedding backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Records that received an embedding.
    pub processed: usize,
    /// Records left without one (provider failure or zero vector).
    pub failed: usize,
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector. Trailing partial chunks are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity (`1 - cosine_distance`).
///
/// Returns 0.0 for mismatched lengths or when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// True if the vector carries no signal: empty, or L2 norm within `f32::EPSILON` of zero.
pub fn is_zero_vector(v: &[f32]) -> bool {
    v.is_empty() || v.iter().map(|x| x * x).sum::<f32>().sqrt() <= f32::EPSILON
}

/// SHA-256 hex digest of an ingestion fingerprint.
pub fn content_hash(fingerprint: &str) -> String {
    hex::encode(Sha256::digest(fingerprint.as_bytes()))
}
