/// Database module for SQLite persistence
///
/// This module owns the SQLite connection pool backing the Memory Store. It
/// uses sqlx with WAL mode for concurrent readers and `synchronous=FULL` so a
/// committed append survives a crash of the process or the machine.
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod memory;

// Re-export commonly used types
pub use memory::{MemoryFilter, MemoryKind, MemoryRecord, MemoryStore, NewMemoryRecord};

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database and run migrations
    ///
    /// SQLite replays a leftover WAL file on open, so records committed before
    /// an unclean shutdown are visible again without extra recovery code.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!("Initializing database at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let connection_string = format!("sqlite:{}", db_path.display());
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Full)
            .busy_timeout(std::time::Duration::from_secs(5))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        debug!("Database connection established");

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Every statement is `IF NOT EXISTS`, so this is safe on every start.
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_initial.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to execute migration 001_initial.sql")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main database file
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to flush WAL")?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Flush the WAL and close all pooled connections
    pub async fn close(self) -> Result<()> {
        info!("Closing database connection");

        self.flush_wal().await?;
        self.pool.close().await;

        info!("Database connection closed");
        Ok(())
    }

    /// Create a memory store handle sharing this pool
    pub fn memory(&self) -> MemoryStore {
        MemoryStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("memory.db");

        let db = Database::new(&db_path).await.unwrap();
        assert!(db_path.exists());

        let result = sqlx::query("SELECT 1").fetch_one(db.pool()).await;
        assert!(result.is_ok());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrations_create_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("memory.db")).await.unwrap();

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();

        for expected in [
            "memory_records",
            "memory_records_fts",
            "conversation",
            "facts",
            "document_references",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_migrations_are_rerunnable() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("memory.db");

        let db = Database::new(&db_path).await.unwrap();
        db.close().await.unwrap();

        let reopened = Database::new(&db_path).await.unwrap();
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wal_and_full_sync_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("memory.db")).await.unwrap();

        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");

        // FULL = 2
        let synchronous: i64 = sqlx::query_scalar("PRAGMA synchronous")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(synchronous, 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_physical_delete_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("memory.db")).await.unwrap();

        sqlx::query(
            "INSERT INTO memory_records (kind, content, created_at) VALUES ('fact', 'x', 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let deleted = sqlx::query("DELETE FROM memory_records")
            .execute(db.pool())
            .await;
        assert!(deleted.is_err());

        let edited = sqlx::query("UPDATE memory_records SET content = 'y'")
            .execute(db.pool())
            .await;
        assert!(edited.is_err());

        db.close().await.unwrap();
    }
}
