// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Keepsake integration tests.
//!
//! Provides mock adapters and a harness for fast, deterministic tests
//! without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Scripted language model with captured requests
//! - [`MockEmbedder`] - Deterministic text-to-vector table
//! - [`TestHarness`] - Temp-dir SQLite plus an engine wired to the mocks

pub mod harness;
pub mod mock_embedder;
pub mod mock_provider;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_embedder::MockEmbedder;
pub use mock_provider::MockProvider;
