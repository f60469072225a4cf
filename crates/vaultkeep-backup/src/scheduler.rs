//! Periodic backups
//!
//! One backup runs immediately, then one per interval until the shutdown
//! future resolves. A run that fails or finds the lock held is logged and the
//! schedule carries on. Shutdown is only observed between runs, so a backup in
//! progress always completes its restart step.

use crate::engine::Engine;
use crate::error::{Error, Result};
use std::future::Future;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

/// Counters for one scheduler session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub succeeded: usize,
    pub failed: usize,
    /// Runs skipped because another operation held the lock
    pub skipped: usize,
}

impl SchedulerStats {
    pub fn runs(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

impl Engine {
    pub async fn run_scheduler<F>(&self, shutdown: F) -> Result<SchedulerStats>
    where
        F: Future<Output = ()>,
    {
        let interval = self.settings.schedule_interval;
        info!(
            "Scheduler started: backup every {} minutes",
            interval.as_secs() / 60
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut stats = SchedulerStats::default();
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_backup().await {
                        Ok(report) => {
                            stats.succeeded += 1;
                            info!("Scheduled backup {} done", report.artifact.id);
                        }
                        Err(e @ Error::OperationInProgress { .. }) => {
                            stats.skipped += 1;
                            warn!("Skipping scheduled backup: {}", e);
                        }
                        Err(e) => {
                            stats.failed += 1;
                            error!("Scheduled backup failed: {}", e);
                        }
                    }
                }
            }
        }

        info!(
            "Scheduler stopped after {} runs ({} failed, {} skipped)",
            stats.runs(),
            stats.failed,
            stats.skipped
        );
        Ok(stats)
    }
}
