//! Feed ingestion: fetching, parsing and normalizing external feeds.
//!
//! # Architecture
//!
//! - [`parser`] - quick-xml reader producing [`RawFeedItem`]s from RSS, RDF and Atom
//! - [`extract`] - snippet and image fallback chains over raw items
//! - [`normalize`] - article and YouTube normalizers
//! - [`fetcher`] - HTTP client with timeout and size limit
//! - [`collector`] - concurrent fan-out over all sources, sort and cap
//! - [`health`] - per-source reachability probe

pub mod collector;
pub mod extract;
pub mod fetcher;
pub mod health;
pub mod normalize;
pub mod parser;
pub mod raw;
pub mod types;

pub use collector::{collect_feed_articles, FeedCollector};
pub use extract::{build_snippet, extract_image_url, strip_html};
pub use fetcher::{FeedClient, FetchError, FetchOptions};
pub use health::{check_sources, SourceStatus};
pub use normalize::{normalise_item, normalise_youtube_item, Normalizer};
pub use parser::{parse_feed, parse_timestamp, to_iso, FieldMappings, ParseError, RawField};
pub use raw::RawFeedItem;
pub use types::{Media, NormalizedArticle, Source, SourceKind};
