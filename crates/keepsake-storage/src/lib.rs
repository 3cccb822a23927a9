// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Keepsake memory engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. The memory table
//! queries live with the engine in `keepsake-memory`.

pub mod database;
pub mod migrations;

pub use database::{Database, map_tr_err};
