use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use newsfeed::feed::{check_sources, FeedCollector, SourceStatus};
use newsfeed::storage::{Database, DatabaseError, PageRequest};
use newsfeed::{parse_page_param, Aggregator, Config, RefreshWorker};

/// Get the config directory path (~/.config/newsfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsfeed"))
}

#[derive(Parser, Debug)]
#[command(
    name = "newsfeed",
    version,
    about = "Aggregates RSS/Atom and YouTube feeds into a paginated article snapshot"
)]
struct Args {
    /// Config file (default: ~/.config/newsfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file, overriding `database_path` from the config
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every source and replace the stored snapshot
    Refresh,
    /// Print one page of the stored snapshot as JSON
    List {
        /// Page size; missing, invalid or 0 means all remaining articles
        #[arg(long)]
        limit: Option<String>,
        /// Articles to skip; missing or invalid means 0
        #[arg(long)]
        offset: Option<String>,
    },
    /// Probe every source and print its reachability
    Status,
    /// Refresh now and then on the configured interval until SIGINT/SIGTERM
    Worker,
}

#[derive(Serialize)]
struct StatusReport {
    statuses: Vec<SourceStatus>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode JSON output")?;
    println!("{json}");
    Ok(())
}

fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        tracing::info!(path = %dir.display(), "Created config directory");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to set config directory permissions to 0700"
                );
            }
        }
    }
    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::Locked) => anyhow::bail!(
            "Database {} is locked by another process. Please try again.",
            path.display()
        ),
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

/// Opens the snapshot database and wires it to the collector.
async fn open_aggregator(
    db_override: Option<PathBuf>,
    config: &Config,
    config_dir: &Path,
    collector: FeedCollector,
) -> Result<(Database, Aggregator<Database>)> {
    let db_path = match db_override {
        Some(path) => path,
        None => {
            ensure_private_dir(config_dir)?;
            config.database_path_or(config_dir)
        }
    };
    let db = open_database(&db_path).await?;
    let aggregator = Aggregator::new(db.clone(), collector, config.sources.clone());
    Ok((db, aggregator))
}

/// Completes on the first SIGINT or SIGTERM.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "Received shutdown signal"),
            _ = sigint.recv() => tracing::info!(signal = "SIGINT", "Received shutdown signal"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!(signal = "ctrl-c", "Received shutdown signal");
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if config.sources.is_empty() {
        tracing::warn!(path = %config_path.display(), "No sources configured");
    }

    let collector =
        FeedCollector::from_options(&config.fetch).context("Failed to build HTTP client")?;

    match args.command {
        Command::Status => {
            let statuses = check_sources(collector.client(), &config.sources).await;
            print_json(&StatusReport { statuses })
        }
        Command::Refresh => {
            let (db, aggregator) = open_aggregator(args.db, &config, &config_dir, collector).await?;
            let result = aggregator.refresh_article_store().await;
            db.close().await;
            let summary = result.context("Failed to refresh feeds")?;
            print_json(&summary)
        }
        Command::List { limit, offset } => {
            let (db, aggregator) = open_aggregator(args.db, &config, &config_dir, collector).await?;
            let request = PageRequest::new(
                limit.as_deref().and_then(parse_page_param),
                offset.as_deref().and_then(parse_page_param),
            );
            let page = aggregator.fetch_latest_articles(request).await;
            db.close().await;
            print_json(&page)
        }
        Command::Worker => {
            let shutdown = shutdown_signal()?;
            let (db, aggregator) = open_aggregator(args.db, &config, &config_dir, collector).await?;
            RefreshWorker::new(Arc::new(aggregator))
                .run(config.refresh_interval(), shutdown)
                .await;
            db.close().await;
            Ok(())
        }
    }
}
