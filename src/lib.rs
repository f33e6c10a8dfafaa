//! Feed aggregation pipeline: fetch RSS/Atom and YouTube feeds concurrently,
//! normalize their items into one article model, and serve pages of an
//! atomically replaced SQLite snapshot.

pub mod aggregator;
pub mod config;
pub mod feed;
pub mod storage;
pub mod worker;

pub use aggregator::{parse_page_param, Aggregator, ArticlesPage, RefreshError, RefreshSummary};
pub use config::{Config, ConfigError};
pub use worker::{RefreshOutcome, RefreshWorker};
