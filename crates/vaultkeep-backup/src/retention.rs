//! Multi-tier retention
//!
//! [`select`] is a pure keep/delete computation over a catalog. [`enforce`]
//! lists the destination, runs the selector and deletes what falls outside
//! the keep-set; individual deletion failures are logged and skipped.

use crate::catalog::{self, ArtifactId, BackupArtifact};
use crate::error::{Error, Result};
use camino::Utf8Path;
use chrono::{Datelike, Weekday};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use tracing::{debug, info, warn};
use vaultkeep_core::VaultkeepConfig;

/// How many artifacts each tier keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub daily_keep: usize,
    pub weekly_keep: usize,
    pub monthly_keep: usize,
    /// Weekday an artifact must be captured on to count as weekly
    pub week_boundary: Weekday,
}

impl RetentionPolicy {
    pub fn new(daily_keep: usize, weekly_keep: usize, monthly_keep: usize) -> Self {
        Self {
            daily_keep,
            weekly_keep,
            monthly_keep,
            week_boundary: Weekday::Sun,
        }
    }

    /// Build from signed counts; negative counts keep nothing in that tier
    pub fn from_counts(daily: i64, weekly: i64, monthly: i64) -> Self {
        let clamp = |n: i64| usize::try_from(n).unwrap_or(0);
        Self::new(clamp(daily), clamp(weekly), clamp(monthly))
    }

    pub fn with_week_boundary(mut self, weekday: Weekday) -> Self {
        self.week_boundary = weekday;
        self
    }

    pub fn from_config(config: &VaultkeepConfig) -> Self {
        let retention = &config.inner().backup.retention;
        Self::from_counts(retention.daily, retention.weekly, retention.monthly)
            .with_week_boundary(config.week_boundary())
    }

    /// Upper bound on the keep-set size
    pub fn max_kept(&self) -> usize {
        self.daily_keep + self.weekly_keep + self.monthly_keep
    }
}

/// Outcome of [`select`], both lists newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub keep: Vec<BackupArtifact>,
    pub delete: Vec<BackupArtifact>,
}

/// Compute which artifacts to keep and which to delete.
///
/// Daily keeps the newest `daily_keep`. Weekly picks, per ISO week, the newest
/// artifact captured on the week-boundary day and keeps the newest
/// `weekly_keep` of those picks. Monthly does the same for artifacts captured
/// on the 1st, per calendar month. The keep-set is the union of the tiers.
pub fn select(policy: &RetentionPolicy, artifacts: &[BackupArtifact]) -> RetentionPlan {
    let mut sorted: Vec<&BackupArtifact> = artifacts.iter().collect();
    sorted.sort_by(|a, b| b.id.cmp(&a.id));

    let mut keep: HashSet<ArtifactId> = HashSet::new();

    keep.extend(sorted.iter().take(policy.daily_keep).map(|a| a.id));

    let mut weeks = BTreeSet::new();
    keep.extend(
        sorted
            .iter()
            .filter(|a| a.id.date().weekday() == policy.week_boundary)
            .filter(|a| {
                let week = a.id.date().iso_week();
                weeks.insert((week.year(), week.week()))
            })
            .take(policy.weekly_keep)
            .map(|a| a.id),
    );

    let mut months = BTreeSet::new();
    keep.extend(
        sorted
            .iter()
            .filter(|a| a.id.date().day() == 1)
            .filter(|a| months.insert((a.id.date().year(), a.id.date().month())))
            .take(policy.monthly_keep)
            .map(|a| a.id),
    );

    let (keep, delete): (Vec<&BackupArtifact>, Vec<&BackupArtifact>) =
        sorted.into_iter().partition(|a| keep.contains(&a.id));

    RetentionPlan {
        keep: keep.into_iter().cloned().collect(),
        delete: delete.into_iter().cloned().collect(),
    }
}

/// Result of applying retention to a destination
#[derive(Debug, Clone, Default)]
pub struct RetentionReport {
    pub kept: usize,
    pub deleted: Vec<ArtifactId>,
    pub failed: Vec<ArtifactId>,
    /// Unencrypted leftovers removed next to their encrypted artifact
    pub plain_copies_removed: usize,
}

/// Apply `policy` to the artifacts in `destination`
pub fn enforce(destination: &Utf8Path, policy: &RetentionPolicy) -> Result<RetentionReport> {
    let artifacts = catalog::list_artifacts(destination).map_err(|e| Error::Retention {
        message: format!("failed to list {}: {}", destination, e),
    })?;

    let plan = select(policy, &artifacts);
    debug!(
        "Retention plan: keep {}, delete {} (policy {}/{}/{})",
        plan.keep.len(),
        plan.delete.len(),
        policy.daily_keep,
        policy.weekly_keep,
        policy.monthly_keep
    );

    let mut report = RetentionReport {
        kept: plan.keep.len(),
        ..Default::default()
    };

    // A plain archive next to its encrypted twin is hidden from the catalog
    for artifact in artifacts.iter().filter(|a| a.encrypted) {
        let plain = destination.join(artifact.id.archive_file_name());
        if !plain.is_file() {
            continue;
        }
        match fs::remove_file(&plain) {
            Ok(()) => {
                info!("Removed unencrypted copy {} of {}", plain, artifact.path);
                report.plain_copies_removed += 1;
            }
            Err(e) => warn!("Failed to remove unencrypted copy {}: {}", plain, e),
        }
    }

    for artifact in plan.delete {
        match fs::remove_file(&artifact.path) {
            Ok(()) => {
                info!("Deleted expired backup {}", artifact.path);
                report.deleted.push(artifact.id);
            }
            Err(e) => {
                warn!("Failed to delete expired backup {}: {}", artifact.path, e);
                report.failed.push(artifact.id);
            }
        }
    }

    Ok(report)
}
