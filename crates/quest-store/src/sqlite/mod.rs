//! Embedded SQLite storage adapter
//!
//! One database file per project. The schema ships as `sqlx` migrations that
//! are applied when the database is opened.

pub mod migrations;

mod catalog;
mod collections;
mod credentials;
mod datasets;
mod project;
mod rows;

pub use migrations::{MigrationError, MigrationManager, MigrationStatus};

use quest_core::error::{QuestError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// How long a connection waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage adapter for one project database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run pending migrations
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        debug!(path = %path.display(), "Connecting to project database");

        // Read-then-write transactions on separate connections fail with
        // SQLITE_BUSY on upgrade, so every statement shares one connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to open project database", e))?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self) -> Result<()> {
        let manager = MigrationManager::new(self.pool.clone());
        manager
            .run_migrations()
            .await
            .map_err(|e| QuestError::Database(format!("Migration failed: {}", e)))
    }

    /// Check migration status
    pub async fn migration_status(&self) -> Result<Vec<MigrationStatus>> {
        let manager = MigrationManager::new(self.pool.clone());
        manager
            .check_status()
            .await
            .map_err(|e| QuestError::Database(format!("Failed to check migration status: {}", e)))
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections; the store is unusable afterwards
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn db_error(context: &str, e: sqlx::Error) -> QuestError {
    QuestError::Database(format!("{}: {}", context, e))
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
