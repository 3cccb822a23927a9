// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express:
//! score ranges, positive limits, and non-empty endpoints.

use crate::diagnostic::ConfigError;
use crate::model::KeepsakeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of failing fast.
pub fn validate_config(config: &KeepsakeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.general.log_level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "general.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.general.log_level
        ));
    }

    let llm = &config.llm;
    if llm.base_url.trim().is_empty() {
        fail("llm.base_url must not be empty".to_string());
    } else if !(llm.base_url.starts_with("http://") || llm.base_url.starts_with("https://")) {
        fail(format!(
            "llm.base_url must start with http:// or https://, got `{}`",
            llm.base_url
        ));
    }
    if llm.chat_model.trim().is_empty() {
        fail("llm.chat_model must not be empty".to_string());
    }
    if llm.embedding_model.trim().is_empty() {
        fail("llm.embedding_model must not be empty".to_string());
    }
    if llm.embedding_dimensions == 0 {
        fail("llm.embedding_dimensions must be greater than 0".to_string());
    }
    if llm.timeout_secs == 0 {
        fail("llm.timeout_secs must be greater than 0".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let r = &config.retrieval;
    if r.max_memories == 0 {
        fail("retrieval.max_memories must be at least 1".to_string());
    }
    if !r.time_decay_factor.is_finite() || r.time_decay_factor < 0.0 {
        fail(format!(
            "retrieval.time_decay_factor must be non-negative, got {}",
            r.time_decay_factor
        ));
    }
    for (key, value) in [
        ("min_relevance_score", r.min_relevance_score),
        ("min_similarity", r.min_similarity),
    ] {
        if !(0.0..=1.0).contains(&value) {
            fail(format!("retrieval.{key} must be within [0, 1], got {value}"));
        }
    }

    if !config.persona.system_prompt_template.contains("{context}") {
        fail("persona.system_prompt_template must contain the {context} placeholder".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
