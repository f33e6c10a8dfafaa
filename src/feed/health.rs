//! Source reachability probe.
//!
//! Every source is fetched and parsed exactly as a refresh would, so a source
//! reported `ok` is one the collector can read. The outcome is reported per
//! source with its latency.

use crate::feed::fetcher::FeedClient;
use crate::feed::parser::to_iso;
use crate::feed::types::Source;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Outcome of probing one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SourceStatus {
    #[serde(rename_all = "camelCase")]
    Ok {
        id: String,
        checked_at: String,
        latency_ms: u64,
        /// Number of items the feed parser found in the document.
        entries: usize,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        id: String,
        checked_at: String,
        error: String,
    },
}

impl SourceStatus {
    pub fn id(&self) -> &str {
        match self {
            SourceStatus::Ok { id, .. } | SourceStatus::Error { id, .. } => id,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SourceStatus::Ok { .. })
    }
}

/// Probes every source concurrently. Results keep the order of `sources`.
pub async fn check_sources(client: &FeedClient, sources: &[Source]) -> Vec<SourceStatus> {
    let started = to_iso(&Utc::now());
    join_all(
        sources
            .iter()
            .map(|source| check_source(client, source, &started)),
    )
    .await
}

async fn check_source(client: &FeedClient, source: &Source, started: &str) -> SourceStatus {
    let timer = Instant::now();
    let outcome = client
        .fetch_items(&source.feed_url)
        .await
        .map(|items| items.len())
        .map_err(|e| e.to_string());

    match outcome {
        Ok(entries) => SourceStatus::Ok {
            id: source.id.clone(),
            checked_at: to_iso(&Utc::now()),
            latency_ms: timer.elapsed().as_millis() as u64,
            entries,
        },
        Err(error) => {
            tracing::warn!(
                source = %source.id,
                title = %source.title,
                error = %error,
                "Source health check failed"
            );
            SourceStatus::Error {
                id: source.id.clone(),
                checked_at: started.to_string(),
                error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::collector::FeedCollector;
    use crate::feed::fetcher::FetchOptions;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
    <item><guid>1</guid><title>One</title></item>
    <item><guid>2</guid><title>Two</title></item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_reports_ok_and_error_per_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let sources = vec![
            Source::article("ok", "Ok", &format!("{}/ok", server.uri())),
            Source::article("down", "Down", &format!("{}/down", server.uri())),
            Source::article("html", "Html", &format!("{}/html", server.uri())),
        ];
        let client = FeedClient::new(&FetchOptions::default()).unwrap();
        let statuses = check_sources(&client, &sources).await;

        let ids: Vec<_> = statuses.iter().map(SourceStatus::id).collect();
        assert_eq!(ids, vec!["ok", "down", "html"]);
        match &statuses[0] {
            SourceStatus::Ok { entries, .. } => assert_eq!(*entries, 2),
            other => panic!("Expected ok status, got {:?}", other),
        }
        match &statuses[1] {
            SourceStatus::Error { error, .. } => assert!(error.contains("502")),
            other => panic!("Expected error status, got {:?}", other),
        }
        assert!(!statuses[2].is_ok());
    }

    #[tokio::test]
    async fn test_json_feed_is_an_error_like_in_refresh() {
        let server = MockServer::start().await;
        let json_feed = r#"{
            "version": "https://jsonfeed.org/version/1.1",
            "title": "Json",
            "items": [{"id": "1", "url": "https://j.example/1", "content_text": "Hi"}]
        }"#;
        Mock::given(method("GET"))
            .and(path("/feed.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/feed+json")
                    .set_body_string(json_feed),
            )
            .mount(&server)
            .await;

        let source = Source::article("j", "Json", &format!("{}/feed.json", server.uri()));
        let options = FetchOptions::default();
        let client = FeedClient::new(&options).unwrap();
        let statuses = check_sources(&client, std::slice::from_ref(&source)).await;
        assert!(matches!(&statuses[0], SourceStatus::Error { id, .. } if id == "j"));

        let collected = FeedCollector::from_options(&options)
            .unwrap()
            .collect(std::slice::from_ref(&source))
            .await;
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn test_entry_count_matches_collected_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&server)
            .await;

        let source = Source::article("ok", "Ok", &format!("{}/ok", server.uri()));
        let client = FeedClient::new(&FetchOptions::default()).unwrap();
        let items = client.fetch_items(&source.feed_url).await.unwrap();
        match &check_sources(&client, &[source]).await[0] {
            SourceStatus::Ok { entries, .. } => assert_eq!(*entries, items.len()),
            other => panic!("Expected ok status, got {:?}", other),
        }
    }

    #[test]
    fn test_status_json_shape() {
        let ok = SourceStatus::Ok {
            id: "a".into(),
            checked_at: "2024-01-01T00:00:00.000Z".into(),
            latency_ms: 42,
            entries: 3,
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["latencyMs"], 42);
        assert_eq!(json["checkedAt"], "2024-01-01T00:00:00.000Z");

        let err = SourceStatus::Error {
            id: "b".into(),
            checked_at: "2024-01-01T00:00:00.000Z".into(),
            error: "HTTP error: status 404".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json.get("latencyMs").is_none());
    }
}
