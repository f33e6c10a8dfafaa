//! Configuration file parser for ~/.config/newsfeed/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which has no sources. Unknown keys are accepted but logged as warnings.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchOptions, Source};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file; defaults to `newsfeed.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Hours between scheduled refreshes in `worker` mode.
    pub refresh_interval_hours: u64,

    /// HTTP and collection settings.
    pub fetch: FetchOptions,

    /// Configured feeds, in display order.
    pub sources: Vec<Source>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            refresh_interval_hours: 24,
            fetch: FetchOptions::default(),
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] =
        ["database_path", "refresh_interval_hours", "fetch", "sources"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Invalid sources or limits → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Checks source identities and URLs, and the numeric limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_hours == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_hours must be at least 1".into(),
            ));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch.timeout_ms must be positive".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let id = source.id.trim();
            if id.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "source '{}' has an empty id",
                    source.title
                )));
            }
            if !seen.insert(id) {
                return Err(ConfigError::Invalid(format!("duplicate source id '{id}'")));
            }
            match url::Url::parse(&source.feed_url) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                Ok(u) => {
                    return Err(ConfigError::Invalid(format!(
                        "source '{id}' uses unsupported scheme '{}'",
                        u.scheme()
                    )))
                }
                Err(e) => {
                    return Err(ConfigError::Invalid(format!(
                        "source '{id}' has an invalid feed URL: {e}"
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours.saturating_mul(60 * 60))
    }

    /// Database path, falling back to `newsfeed.db` inside `config_dir`.
    pub fn database_path_or(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("newsfeed.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================
