use serde::{Deserialize, Serialize};

// ============================================================================
// Source Registry
// ============================================================================

/// Kind of content a source publishes. Selects the normalizer for its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Article,
    Video,
}

/// One configured external feed.
///
/// Sources are read from the `[[sources]]` array of the config file and never
/// mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub title: String,
    #[serde(alias = "feedUrl")]
    pub feed_url: String,
    #[serde(default)]
    pub kind: SourceKind,
    /// Channel id used for video items whose feed omits one.
    #[serde(default, alias = "channelId", skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "logoUrl", skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl Source {
    /// Convenience constructor for a plain article feed.
    pub fn article(id: &str, title: &str, feed_url: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            feed_url: feed_url.to_string(),
            kind: SourceKind::Article,
            channel_id: None,
            description: None,
            logo_url: None,
        }
    }

    /// Convenience constructor for a YouTube channel feed.
    pub fn video(id: &str, title: &str, feed_url: &str, channel_id: Option<&str>) -> Self {
        Self {
            kind: SourceKind::Video,
            channel_id: channel_id.map(str::to_string),
            ..Self::article(id, title, feed_url)
        }
    }
}

// ============================================================================
// Normalized Article
// ============================================================================

/// Media-specific part of an article record.
///
/// Serialized as a `mediaType` tag flattened into the article, so video-only
/// fields can never appear on an `"article"` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mediaType", rename_all = "lowercase")]
pub enum Media {
    Article,
    #[serde(rename_all = "camelCase")]
    Video {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<u32>,
    },
}

impl Media {
    /// Value stored in the `media_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Media::Article => "article",
            Media::Video { .. } => "video",
        }
    }
}

/// The canonical unit persisted and served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedArticle {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub source_id: String,
    #[serde(flatten)]
    pub media: Media,
}

impl NormalizedArticle {
    /// Publish time in epoch milliseconds; missing or unparseable dates count as 0.
    pub fn published_millis(&self) -> i64 {
        self.published_at
            .as_deref()
            .and_then(crate::feed::parse_timestamp)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(0)
    }
}
