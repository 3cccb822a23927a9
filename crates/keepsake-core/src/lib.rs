// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Keepsake memory engine.
//!
//! Provides the error type, the adapter traits for the embedding and
//! language-model collaborators, and the request/response types they
//! exchange. Everything else in the workspace builds on these.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::KeepsakeError;
pub use types::{AdapterType, HealthStatus};

pub use traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
