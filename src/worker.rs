//! Periodic refresh with an in-flight guard.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::aggregator::{Aggregator, RefreshSummary};
use crate::storage::ArticleStore;

pub const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// What happened to one refresh trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(RefreshSummary),
    Failed(String),
    /// Another refresh was still running; nothing was done.
    Skipped,
}

/// Clears the in-flight flag when the refresh ends, including on panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RefreshWorker<S> {
    aggregator: Arc<Aggregator<S>>,
    running: Arc<AtomicBool>,
}

impl<S> Clone for RefreshWorker<S> {
    fn clone(&self) -> Self {
        Self {
            aggregator: Arc::clone(&self.aggregator),
            running: Arc::clone(&self.running),
        }
    }
}

impl<S: ArticleStore + 'static> RefreshWorker<S> {
    pub fn new(aggregator: Arc<Aggregator<S>>) -> Self {
        Self {
            aggregator,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one refresh unless one is already in flight.
    ///
    /// Overlapping triggers are skipped, never queued.
    pub async fn try_refresh(&self) -> RefreshOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Refresh already in progress, skipping");
            return RefreshOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        match self.aggregator.refresh_article_store().await {
            Ok(summary) => {
                tracing::info!(
                    count = summary.count,
                    fetched_at = %summary.fetched_at,
                    "Scheduled refresh completed"
                );
                RefreshOutcome::Completed(summary)
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled refresh failed");
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }

    /// Refreshes immediately, then once per `interval`, until `shutdown`
    /// completes. Each refresh runs in its own task so a slow run never delays
    /// the schedule; the guard turns overlaps into skips.
    pub async fn run<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(interval_secs = interval.as_secs(), "Refresh worker started");
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Refresh worker shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.try_refresh().await;
                    });
                }
            }
        }
    }
}
