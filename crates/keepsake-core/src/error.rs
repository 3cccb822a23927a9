// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Keepsake memory engine.

use thiserror::Error;

/// The error type shared by every adapter trait and store operation.
///
/// Core components (dedup gate, conflict resolver, ranker, router) never
/// surface these to their callers: each maps a failure onto its documented
/// fallback branch. Only adapters, the store and the ingestor's final
/// insert return them.
#[derive(Debug, Error)]
pub enum KeepsakeError {
    /// Configuration errors (invalid TOML, missing API key, bad header value).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote provider errors (embedding or language-model call failed).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A model answered, but not in the shape that was asked for.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeepsakeError {
    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        KeepsakeError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if the error came from an unavailable or misbehaving
    /// remote service rather than from local state.
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(
            self,
            KeepsakeError::Provider { .. }
                | KeepsakeError::Timeout { .. }
                | KeepsakeError::MalformedOutput(_)
        )
    }
}
