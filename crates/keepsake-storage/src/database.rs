// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use keepsake_config::model::StorageConfig;
use keepsake_core::KeepsakeError;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// Handle to the Keepsake SQLite database.
///
/// Cloning is cheap: clones share the same background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, KeepsakeError> {
        Self::open_with_options(path, true).await
    }

    /// Open the database described by a `[storage]` config section.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, KeepsakeError> {
        Self::open_with_options(&config.database_path, config.wal_mode).await
    }

    /// Open the database at `path`, choosing the journal mode explicitly.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, KeepsakeError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| KeepsakeError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = Connection::open(path).await.map_err(map_open_err)?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        info!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database with migrations applied.
    pub async fn open_in_memory() -> Result<Self, KeepsakeError> {
        let conn = Connection::open_in_memory().await.map_err(map_open_err)?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), KeepsakeError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    let _mode: String = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        "WAL",
                        |row| row.get(0),
                    )?;
                }
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| -> Result<(), KeepsakeError> { crate::migrations::run_migrations(conn) })
            .await
            .map_err(|e| KeepsakeError::Storage {
                source: e.to_string().into(),
            })?;
        debug!("migrations applied");
        Ok(())
    }

    /// The shared async connection. All queries go through `call()`.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Round-trip a trivial query to verify the connection is alive.
    pub async fn ping(&self) -> Result<(), KeepsakeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), KeepsakeError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Opening a connection reports plain rusqlite errors.
fn map_open_err(e: rusqlite::Error) -> KeepsakeError {
    KeepsakeError::Storage {
        source: Box::new(e),
    }
}

/// Convert tokio-rusqlite errors into `KeepsakeError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KeepsakeError {
    KeepsakeError::Storage {
        source: Box::new(e),
    }
}
