//! Configuration file loading and validation

use crate::error::{Error, Result};
use crate::types::VaultkeepConfigFile;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Weekday;
use std::fs;
use std::time::Duration;
use tracing::debug;

/// Loaded and validated vaultkeep configuration.
///
/// Everything downstream treats this as an immutable, already validated input
/// for the duration of one run.
#[derive(Debug, Clone)]
pub struct VaultkeepConfig {
    /// The parsed configuration
    pub config: VaultkeepConfigFile,

    /// Path to the configuration file
    pub config_path: Utf8PathBuf,

    week_boundary: Weekday,
}

impl VaultkeepConfig {
    /// Load and validate configuration from the given path
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(path.as_str())
            } else {
                Error::Io(e)
            }
        })?;

        debug!("Loaded configuration from {}", path);
        Self::from_yaml(&content, path.to_owned())
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str, config_path: Utf8PathBuf) -> Result<Self> {
        let config: VaultkeepConfigFile = serde_yaml_ng::from_str(content)?;
        let week_boundary = validate(&config)?;

        Ok(Self {
            config,
            config_path,
            week_boundary,
        })
    }

    /// Get the inner configuration file
    pub fn inner(&self) -> &VaultkeepConfigFile {
        &self.config
    }

    /// Container name
    pub fn container_name(&self) -> &str {
        &self.config.application.container_name
    }

    /// Application data directory
    pub fn data_dir(&self) -> &Utf8Path {
        &self.config.application.data_dir
    }

    /// Whether container start/stop is managed outside vaultkeep
    pub fn skip_start_stop(&self) -> bool {
        self.config.application.skip_start_stop
    }

    /// Local destination directory for artifacts
    pub fn destination(&self) -> &Utf8Path {
        &self.config.backup.destination.path
    }

    /// Parent directory for restore staging directories
    pub fn restore_temp_dir(&self) -> &Utf8Path {
        &self.config.backup.restore.temp_dir
    }

    /// Directory holding the operation lock
    pub fn lock_dir(&self) -> &Utf8Path {
        self.config
            .backup
            .lock_dir
            .as_deref()
            .unwrap_or_else(|| self.destination())
    }

    /// Weekday marking the weekly retention tier
    pub fn week_boundary(&self) -> Weekday {
        self.week_boundary
    }

    /// Timeout for external commands, `None` when disabled
    pub fn command_timeout(&self) -> Option<Duration> {
        match self.config.backup.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Timeout for archive creation and extraction, `None` when disabled
    pub fn archive_timeout(&self) -> Option<Duration> {
        let backup = &self.config.backup;
        match backup.archive_timeout_secs.unwrap_or(backup.command_timeout_secs) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Gzip compression level, clamped to 1..=9
    pub fn compression_level(&self) -> u32 {
        self.config.backup.compression_level.clamp(1, 9)
    }

    /// Interval between scheduled backups
    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.config.backup.schedule.interval_minutes.saturating_mul(60))
    }

    /// Recipient key id when encryption is enabled
    pub fn encryption_key(&self) -> Option<&str> {
        let enc = &self.config.backup.encryption;
        enc.enabled.then_some(enc.gpg_key_id.as_str())
    }

    /// Whether a failed encryption fails the whole backup
    pub fn encryption_mandatory(&self) -> bool {
        self.config.backup.encryption.mandatory
    }

    /// Owner uid/gid for restored files, when both are set
    pub fn restore_ownership(&self) -> Option<(u32, u32)> {
        self.config.backup.restore.ownership()
    }
}

/// Longest accepted schedule interval
const MAX_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

/// Checks every rule serde cannot express. Returns the parsed week boundary.
fn validate(config: &VaultkeepConfigFile) -> Result<Weekday> {
    let app = &config.application;
    if app.container_name.trim().is_empty() {
        return Err(Error::missing_field("application.container_name"));
    }
    require_absolute("application.data_dir", &app.data_dir)?;

    let backup = &config.backup;
    if backup.schedule.interval_minutes == 0 {
        return Err(Error::invalid_config(
            "backup.schedule.interval_minutes must be a positive integer",
        ));
    }
    if backup.schedule.interval_minutes > MAX_INTERVAL_MINUTES {
        return Err(Error::invalid_config(format!(
            "backup.schedule.interval_minutes must be at most {} (one year), got {}",
            MAX_INTERVAL_MINUTES, backup.schedule.interval_minutes
        )));
    }

    if backup.destination.kind != "local" {
        return Err(Error::unsupported_destination(&backup.destination.kind));
    }
    require_absolute("backup.destination.path", &backup.destination.path)?;

    let retention = &backup.retention;
    for (key, value) in [
        ("daily", retention.daily),
        ("weekly", retention.weekly),
        ("monthly", retention.monthly),
    ] {
        if value < 0 {
            return Err(Error::invalid_config(format!(
                "backup.retention.{} must be a non-negative integer, got {}",
                key, value
            )));
        }
    }
    let week_boundary: Weekday = retention.week_boundary.trim().parse().map_err(|_| {
        Error::invalid_config(format!(
            "backup.retention.week_boundary is not a weekday: '{}'",
            retention.week_boundary
        ))
    })?;

    if backup.restore.temp_dir.as_str().trim().is_empty() {
        return Err(Error::missing_field("backup.restore.temp_dir"));
    }
    let restore = &backup.restore;
    if restore.owner_uid.is_some() != restore.owner_gid.is_some() {
        return Err(Error::invalid_config(
            "backup.restore.owner_uid and owner_gid must be set together",
        ));
    }

    let enc = &backup.encryption;
    if enc.enabled && enc.gpg_key_id.trim().is_empty() {
        return Err(Error::invalid_config(
            "backup.encryption.gpg_key_id is required when encryption is enabled",
        ));
    }

    Ok(week_boundary)
}

fn require_absolute(key: &str, path: &Utf8Path) -> Result<()> {
    if path.as_str().is_empty() {
        return Err(Error::missing_field(key));
    }
    if !path.is_absolute() {
        return Err(Error::invalid_config(format!(
            "{} must be an absolute path, got '{}'",
            key, path
        )));
    }
    Ok(())
}
