use crate::feed::{Media, NormalizedArticle};
use sqlx::FromRow;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database errors with specific handling for lock conditions
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Database is locked by another process. Please try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored row could not be mapped back to an article
    #[error("Corrupt article row {id}: {reason}")]
    CorruptRow { id: String, reason: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Page window over the stored snapshot.
///
/// Non-positive or missing `limit` means "everything after `offset`";
/// non-positive or missing `offset` means 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageRequest {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self { limit, offset }
    }

    pub fn effective_limit(&self) -> Option<i64> {
        self.limit.filter(|l| *l > 0)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.filter(|o| *o > 0).unwrap_or(0)
    }
}

/// One page of stored articles plus the snapshot size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredPage {
    pub items: Vec<NormalizedArticle>,
    pub total: i64,
}

// ============================================================================
// Row Mapping
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub link: String,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
    pub source_id: String,
    pub media_type: String,
    pub video_id: Option<String>,
    pub channel_id: Option<String>,
    pub duration_seconds: Option<i64>,
}

impl TryFrom<ArticleRow> for NormalizedArticle {
    type Error = DatabaseError;

    fn try_from(row: ArticleRow) -> Result<Self, Self::Error> {
        let media = match row.media_type.as_str() {
            "article" => Media::Article,
            "video" => Media::Video {
                video_id: row.video_id,
                channel_id: row.channel_id,
                duration_seconds: row.duration_seconds.and_then(|d| u32::try_from(d).ok()),
            },
            other => {
                return Err(DatabaseError::CorruptRow {
                    id: row.id,
                    reason: format!("unknown media type '{other}'"),
                })
            }
        };

        Ok(NormalizedArticle {
            id: row.id,
            title: row.title,
            snippet: row.snippet,
            link: row.link,
            image_url: row.image_url,
            published_at: row.published_at,
            source_id: row.source_id,
            media,
        })
    }
}
