// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Keepsake memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Keepsake configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeepsakeConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub general: GeneralConfig,

    /// OpenAI-compatible language-model and embedding endpoint.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retrieval (relevance ranking) settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Persona used by the response generator.
    #[serde(default)]
    pub persona: PersonaConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Display name used in logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_name() -> String {
    "keepsake".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Language-model and embedding endpoint configuration.
///
/// Any OpenAI-compatible server works: the chat completions and embeddings
/// routes are resolved relative to `base_url`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// API key. Falls back to `KEEPSAKE_API_KEY`, then `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API (without trailing route).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model (or endpoint id) for routing, adjudication, extraction and generation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model (or endpoint id) for text embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Fixed embedding dimension. Must match what is already stored.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Per-request timeout in seconds. Timeouts are treated as provider failures.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> usize {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("keepsake").join("keepsake.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("keepsake.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Retrieval configuration for the relevance ranker.
///
/// `final_score = similarity * 0.8 + time_factor * 0.2` where
/// `time_factor = 1 / (1 + days_ago * time_decay_factor)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// When false, the RETRIEVE stage returns no context.
    #[serde(default = "default_retrieval_enabled")]
    pub enabled: bool,

    /// Maximum number of items handed to generation.
    #[serde(default = "default_max_memories")]
    pub max_memories: usize,

    /// Number of recent dialogue turns handed to generation.
    #[serde(default = "default_max_recent_messages")]
    pub max_recent_messages: usize,

    /// Per-day decay applied to the recency factor.
    #[serde(default = "default_time_decay_factor")]
    pub time_decay_factor: f64,

    /// Inclusive floor on the combined relevance score.
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: f64,

    /// Inclusive floor on raw vector similarity for candidates.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: default_retrieval_enabled(),
            max_memories: default_max_memories(),
            max_recent_messages: default_max_recent_messages(),
            time_decay_factor: default_time_decay_factor(),
            min_relevance_score: default_min_relevance_score(),
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_retrieval_enabled() -> bool {
    true
}

fn default_max_memories() -> usize {
    5
}

fn default_max_recent_messages() -> usize {
    10
}

fn default_time_decay_factor() -> f64 {
    0.1
}

fn default_min_relevance_score() -> f64 {
    0.35
}

fn default_min_similarity() -> f64 {
    0.5
}

/// Persona configuration for the response generator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaConfig {
    /// Name of the tracked person used when a request does not supply one.
    #[serde(default = "default_subject_name")]
    pub subject_name: String,

    /// System prompt template. Recognised placeholders: `{target_name}`,
    /// `{profile_summary}`, `{preferences}`, `{context}`.
    #[serde(default = "default_system_prompt_template")]
    pub system_prompt_template: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            subject_name: default_subject_name(),
            system_prompt_template: default_system_prompt_template(),
        }
    }
}

fn default_subject_name() -> String {
    "them".to_string()
}

fn default_system_prompt_template() -> String {
    "You are a thoughtful relationship mentor. The user is asking about {target_name}.\n\n\
     Profile: {profile_summary}\n\
     Preferences: {preferences}\n\n\
     Relevant history:\n{context}\n\n\
     Answer warmly and concretely. Only rely on the history above for facts."
        .to_string()
}
