use crate::feed::fetcher::{FeedClient, FetchError, FetchOptions};
use crate::feed::normalize::Normalizer;
use crate::feed::types::{NormalizedArticle, Source};
use futures::future::join_all;
use std::cmp::Reverse;
use std::collections::HashSet;

/// Fans out over every configured source and merges the results into one
/// recency-ordered, capped article list.
#[derive(Debug, Clone)]
pub struct FeedCollector {
    client: FeedClient,
    items_per_source: usize,
    max_articles: usize,
}

impl FeedCollector {
    pub fn new(client: FeedClient, options: &FetchOptions) -> Self {
        Self {
            client,
            items_per_source: options.items_per_source,
            max_articles: options.max_articles,
        }
    }

    pub fn from_options(options: &FetchOptions) -> Result<Self, FetchError> {
        Ok(Self::new(FeedClient::new(options)?, options))
    }

    pub fn client(&self) -> &FeedClient {
        &self.client
    }

    /// Collects articles from all sources concurrently.
    ///
    /// A source that fails to fetch or parse is logged and contributes
    /// nothing; the collection as a whole never fails.
    pub async fn collect(&self, sources: &[Source]) -> Vec<NormalizedArticle> {
        let per_source = join_all(sources.iter().map(|source| self.collect_source(source))).await;

        let mut articles: Vec<NormalizedArticle> = per_source.into_iter().flatten().collect();
        let normalized = articles.len();

        // Stable: equal timestamps keep source configuration order.
        articles.sort_by_cached_key(|a| Reverse(a.published_millis()));

        let mut seen = HashSet::with_capacity(articles.len());
        articles.retain(|a| seen.insert(a.id.clone()));
        let duplicates = normalized - articles.len();
        if duplicates > 0 {
            tracing::debug!(duplicates, "Dropped articles with repeated ids");
        }

        articles.truncate(self.max_articles);
        tracing::info!(
            sources = sources.len(),
            normalized,
            kept = articles.len(),
            "Collected feed articles"
        );
        articles
    }

    async fn collect_source(&self, source: &Source) -> Vec<NormalizedArticle> {
        let items = match self.client.fetch_items(&source.feed_url).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    source = %source.id,
                    feed = %source.feed_url,
                    error = %e,
                    "Failed to load feed, skipping source"
                );
                return Vec::new();
            }
        };

        let normalizer = Normalizer::for_source(source);
        items
            .iter()
            .take(self.items_per_source)
            .enumerate()
            .filter_map(|(index, item)| normalizer.normalize(item, &source.id, index))
            .collect()
    }
}

/// One-shot collection with a client built from `options`.
pub async fn collect_feed_articles(
    options: &FetchOptions,
    sources: &[Source],
) -> Result<Vec<NormalizedArticle>, FetchError> {
    let collector = FeedCollector::from_options(options)?;
    Ok(collector.collect(sources).await)
}
