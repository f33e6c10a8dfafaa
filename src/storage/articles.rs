use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{ArticleRow, DatabaseError, PageRequest, StoredPage};
use crate::feed::{parse_timestamp, Media, NormalizedArticle};

/// Rows per INSERT statement. 13 columns * 50 = 650 parameters, under SQLite's 999 limit.
const BATCH_SIZE: usize = 50;

const SELECT_COLUMNS: &str = "SELECT id, title, snippet, link, image_url, published_at, source_id, \
     media_type, video_id, channel_id, duration_seconds FROM articles";

/// Sort key column: epoch millis, 0 when the date does not parse, NULL when absent.
fn sort_timestamp(published_at: Option<&str>) -> Option<i64> {
    published_at.map(|raw| {
        parse_timestamp(raw)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(0)
    })
}

impl Database {
    // ========================================================================
    // Snapshot Operations
    // ========================================================================

    /// Replace the whole snapshot with `articles`, stamped `fetched_at`.
    ///
    /// Delete, bulk insert and the snapshot metadata update run in one
    /// transaction. Any failure rolls back and the previous snapshot stays
    /// visible. Article ids must be unique.
    pub async fn replace_all(
        &self,
        articles: &[NormalizedArticle],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let stamp = fetched_at.timestamp_millis();
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query("DELETE FROM articles").execute(&mut *tx).await?;

        for chunk in articles.chunks(BATCH_SIZE) {
            let mut insert_builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO articles (id, title, snippet, link, image_url, published_at, published_ts, \
                 source_id, media_type, video_id, channel_id, duration_seconds, fetched_at) ",
            );

            insert_builder.push_values(chunk, |mut b, article| {
                let (video_id, channel_id, duration) = match &article.media {
                    Media::Article => (None, None, None),
                    Media::Video {
                        video_id,
                        channel_id,
                        duration_seconds,
                    } => (
                        video_id.clone(),
                        channel_id.clone(),
                        duration_seconds.map(i64::from),
                    ),
                };
                b.push_bind(&article.id)
                    .push_bind(&article.title)
                    .push_bind(&article.snippet)
                    .push_bind(&article.link)
                    .push_bind(&article.image_url)
                    .push_bind(&article.published_at)
                    .push_bind(sort_timestamp(article.published_at.as_deref()))
                    .push_bind(&article.source_id)
                    .push_bind(article.media.as_str())
                    .push_bind(video_id)
                    .push_bind(channel_id)
                    .push_bind(duration)
                    .push_bind(stamp);
            });

            insert_builder.build().execute(&mut *tx).await?;
        }

        sqlx::query(
            "INSERT INTO snapshot (id, fetched_at) VALUES (1, ?) \
             ON CONFLICT(id) DO UPDATE SET fetched_at = excluded.fetched_at",
        )
        .bind(stamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        tracing::debug!(count = articles.len(), "Replaced article snapshot");
        Ok(())
    }

    /// Read one page of the snapshot together with its total size.
    ///
    /// Both reads share a transaction, so the page and the total always
    /// describe the same snapshot. Order: dated first, newest first, then id.
    pub async fn query_page(&self, request: PageRequest) -> Result<StoredPage, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let sql = format!(
            "{SELECT_COLUMNS} ORDER BY (published_ts IS NULL), published_ts DESC, id ASC \
             LIMIT ? OFFSET ?"
        );
        // LIMIT -1 means no limit in SQLite
        let rows: Vec<ArticleRow> = sqlx::query_as(&sql)
            .bind(request.effective_limit().unwrap_or(-1))
            .bind(request.effective_offset())
            .fetch_all(&mut *tx)
            .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        let items = rows
            .into_iter()
            .map(NormalizedArticle::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StoredPage { items, total })
    }

    /// Time of the last successful `replace_all`, if any.
    pub async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT fetched_at FROM snapshot WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(millis,)| DateTime::from_timestamp_millis(millis)))
    }
}
