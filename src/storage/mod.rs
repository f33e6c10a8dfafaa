mod articles;
mod schema;
mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::feed::NormalizedArticle;

pub use schema::Database;
pub use types::{DatabaseError, PageRequest, StoredPage};

/// Persistence contract for the article snapshot.
///
/// `replace_all` must be atomic: a concurrent `query_page` observes either the
/// complete previous snapshot or the complete new one.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn replace_all(
        &self,
        articles: &[NormalizedArticle],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    async fn query_page(&self, request: PageRequest) -> Result<StoredPage, DatabaseError>;

    async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>, DatabaseError>;
}

#[async_trait]
impl ArticleStore for Database {
    async fn replace_all(
        &self,
        articles: &[NormalizedArticle],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        Database::replace_all(self, articles, fetched_at).await
    }

    async fn query_page(&self, request: PageRequest) -> Result<StoredPage, DatabaseError> {
        Database::query_page(self, request).await
    }

    async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        Database::last_fetched_at(self).await
    }
}
