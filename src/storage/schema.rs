use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

/// SQLite-backed article store. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database behind a single pooled
    /// connection: shared-cache table locks ignore `busy_timeout`, so reads
    /// queue on the pool instead of failing while a refresh writes. File
    /// databases are created if missing and run in WAL mode so readers keep
    /// seeing the previous snapshot while a refresh writes.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Locked` if another process holds the database
    /// lock, `DatabaseError::Migration` if the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == ":memory:";
        let url = format!("sqlite:{}?mode=rwc", path);

        #[cfg(unix)]
        if !in_memory {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            let parent_exists = db_path
                .parent()
                .is_some_and(|p| p.as_os_str().is_empty() || p.exists());
            if !db_path.exists() && parent_exists {
                // Pre-create with owner-only permissions; SQLite reports any failure at connect.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        // busy_timeout=5000: wait up to 5 seconds for locks before SQLITE_BUSY.
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::Other(e) => DatabaseError::Migration(e.to_string()),
            locked => locked,
        })?;
        Ok(db)
    }

    /// Close all pooled connections, checkpointing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL,
                snippet TEXT NOT NULL,
                link TEXT NOT NULL,
                image_url TEXT,
                published_at TEXT,
                published_ts INTEGER,
                source_id TEXT NOT NULL,
                media_type TEXT NOT NULL CHECK (media_type IN ('article', 'video')),
                video_id TEXT,
                channel_id TEXT,
                duration_seconds INTEGER,
                fetched_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Serves the page ordering: dated first, newest first, id as tie-break
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_recency ON articles((published_ts IS NULL), published_ts DESC, id)",
        )
        .execute(&mut *tx)
        .await?;

        // Single-row table describing the current snapshot
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                fetched_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
