//! Refresh and read orchestration over the collector and the article store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::feed::{to_iso, FeedCollector, NormalizedArticle, Source};
use crate::storage::{ArticleStore, DatabaseError, PageRequest};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Failed to store refreshed articles: {0}")]
    Store(#[from] DatabaseError),
}

/// Result of a completed refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub count: usize,
    pub fetched_at: String,
}

/// One page as served to readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlesPage {
    pub articles: Vec<NormalizedArticle>,
    pub has_more: bool,
    pub last_fetched_at: Option<String>,
    pub total: i64,
}

pub struct Aggregator<S> {
    store: S,
    collector: FeedCollector,
    sources: Arc<Vec<Source>>,
}

impl<S: ArticleStore> Aggregator<S> {
    pub fn new(store: S, collector: FeedCollector, sources: Vec<Source>) -> Self {
        Self {
            store,
            collector,
            sources: Arc::new(sources),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Collects every source and atomically replaces the stored snapshot.
    ///
    /// All persisted articles share one `fetchedAt` stamp. Source failures
    /// only shrink the snapshot; a store failure is returned and leaves the
    /// previous snapshot in place.
    pub async fn refresh_article_store(&self) -> Result<RefreshSummary, RefreshError> {
        let articles = self.collector.collect(&self.sources).await;
        let fetched_at = Utc::now();

        self.store.replace_all(&articles, fetched_at).await?;

        let summary = RefreshSummary {
            count: articles.len(),
            fetched_at: to_iso(&fetched_at),
        };
        tracing::info!(count = summary.count, fetched_at = %summary.fetched_at, "Refreshed article store");
        Ok(summary)
    }

    /// Reads one page of the current snapshot.
    ///
    /// Store errors are logged and degrade to an empty page.
    pub async fn fetch_latest_articles(&self, request: PageRequest) -> ArticlesPage {
        let (page, last_fetched) =
            tokio::join!(self.store.query_page(request), self.store.last_fetched_at());

        let (page, last_fetched) = match (page, last_fetched) {
            (Ok(page), Ok(last_fetched)) => (page, last_fetched),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to read articles from store");
                return ArticlesPage::default();
            }
        };

        let window = request
            .effective_limit()
            .unwrap_or(page.items.len() as i64);
        let has_more = request.effective_offset().saturating_add(window) < page.total;

        ArticlesPage {
            articles: page.items,
            has_more,
            last_fetched_at: last_fetched.as_ref().map(to_iso),
            total: page.total,
        }
    }
}

/// Parses a user-supplied `limit`/`offset` value.
///
/// Reads a leading decimal integer (`"12"`, `" 12px"`); anything without one,
/// and negative numbers, count as absent.
pub fn parse_page_param(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    let parsed: i64 = digits[..end].parse().ok()?;
    if negative && parsed > 0 {
        return None;
    }
    Some(if negative { 0 } else { parsed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FetchOptions, Media};
    use crate::storage::{Database, StoredPage};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FailingStore;

    #[async_trait]
    impl ArticleStore for FailingStore {
        async fn replace_all(
            &self,
            _articles: &[NormalizedArticle],
            _fetched_at: DateTime<Utc>,
        ) -> Result<(), DatabaseError> {
            Err(DatabaseError::Locked)
        }

        async fn query_page(&self, _request: PageRequest) -> Result<StoredPage, DatabaseError> {
            Err(DatabaseError::Locked)
        }

        async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
            Ok(None)
        }
    }

    fn article(id: &str, day: u32) -> NormalizedArticle {
        NormalizedArticle {
            id: id.into(),
            title: id.into(),
            snippet: "s".into(),
            link: format!("https://e.x/{id}"),
            image_url: None,
            published_at: Some(format!("2024-01-{day:02}T00:00:00.000Z")),
            source_id: "src".into(),
            media: Media::Article,
        }
    }

    fn collector() -> FeedCollector {
        FeedCollector::from_options(&FetchOptions::default()).unwrap()
    }

    async fn seeded(count: u32) -> Aggregator<Database> {
        let db = Database::open(":memory:").await.unwrap();
        let articles: Vec<_> = (1..=count).map(|d| article(&format!("a{d:02}"), d)).collect();
        let stamp = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        db.replace_all(&articles, stamp).await.unwrap();
        Aggregator::new(db, collector(), Vec::new())
    }

    #[tokio::test]
    async fn test_page_has_more() {
        let aggregator = seeded(12).await;

        let page = aggregator
            .fetch_latest_articles(PageRequest::new(Some(5), Some(5)))
            .await;
        assert_eq!(page.articles.len(), 5);
        assert!(page.has_more);
        assert_eq!(page.total, 12);
        assert_eq!(page.last_fetched_at.as_deref(), Some("2024-02-01T12:00:00.000Z"));

        let last = aggregator
            .fetch_latest_articles(PageRequest::new(Some(5), Some(10)))
            .await;
        assert_eq!(last.articles.len(), 2);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn test_unbounded_page_has_no_more() {
        let aggregator = seeded(4).await;
        let page = aggregator.fetch_latest_articles(PageRequest::default()).await;
        assert_eq!(page.articles.len(), 4);
        assert!(!page.has_more);

        let tail = aggregator
            .fetch_latest_articles(PageRequest::new(None, Some(1)))
            .await;
        assert_eq!(tail.articles.len(), 3);
        assert!(!tail.has_more);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_empty_page() {
        let aggregator = Aggregator::new(FailingStore, collector(), Vec::new());
        let page = aggregator
            .fetch_latest_articles(PageRequest::new(Some(5), None))
            .await;
        assert_eq!(page, ArticlesPage::default());
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["lastFetchedAt"], serde_json::Value::Null);
        assert_eq!(json["hasMore"], false);
    }

    #[tokio::test]
    async fn test_refresh_persists_collected_articles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<rss><channel>
                    <item><guid>g1</guid><title>One</title><link>https://e.x/1</link></item>
                    <item><guid>g2</guid><title>Two</title><link>https://e.x/2</link></item>
                    <item><title>No link</title></item>
                </channel></rss>"#,
            ))
            .mount(&server)
            .await;

        let db = Database::open(":memory:").await.unwrap();
        let sources = vec![Source::article("s", "S", &server.uri())];
        let aggregator = Aggregator::new(db, collector(), sources);

        let summary = aggregator.refresh_article_store().await.unwrap();
        assert_eq!(summary.count, 2);

        let page = aggregator.fetch_latest_articles(PageRequest::default()).await;
        assert_eq!(page.total, 2);
        assert_eq!(page.last_fetched_at, Some(summary.fetched_at));
    }

    #[tokio::test]
    async fn test_refresh_surfaces_store_failure() {
        let aggregator = Aggregator::new(FailingStore, collector(), Vec::new());
        match aggregator.refresh_article_store().await {
            Err(RefreshError::Store(DatabaseError::Locked)) => {}
            other => panic!("Expected store error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_page_param() {
        assert_eq!(parse_page_param("10"), Some(10));
        assert_eq!(parse_page_param("0"), Some(0));
        assert_eq!(parse_page_param(" 7abc"), Some(7));
        assert_eq!(parse_page_param("abc"), None);
        assert_eq!(parse_page_param(""), None);
        assert_eq!(parse_page_param("-3"), None);
        assert_eq!(parse_page_param("-0"), Some(0));
    }
}
