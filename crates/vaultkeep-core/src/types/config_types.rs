//! Configuration types for vaultkeep.yaml

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Default command timeout in seconds (container runtime and gpg calls)
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Default gzip compression level (balanced speed/ratio)
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Root vaultkeep.yaml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultkeepConfigFile {
    /// The application whose data is backed up
    pub application: ApplicationConfig,

    /// Backup, retention and restore settings
    pub backup: BackupConfig,
}

/// Application container and data location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Container name or id passed to the container runtime
    pub container_name: String,

    /// Host path of the application's data directory
    pub data_dir: Utf8PathBuf,

    /// Leave the container lifecycle to the caller
    #[serde(default)]
    pub skip_start_stop: bool,
}

/// Backup section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Periodic trigger settings
    pub schedule: ScheduleConfig,

    /// Where artifacts are stored
    pub destination: DestinationConfig,

    /// Retention policy counts
    pub retention: RetentionConfig,

    /// Restore settings
    pub restore: RestoreConfig,

    /// Optional gpg encryption
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// Timeout for external commands, 0 disables
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Timeout for archive creation and extraction, 0 disables.
    /// Falls back to `command_timeout_secs` when unset.
    #[serde(default)]
    pub archive_timeout_secs: Option<u64>,

    /// Gzip level (1-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Directory holding the operation lock (defaults to the destination path)
    #[serde(default)]
    pub lock_dir: Option<Utf8PathBuf>,
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between scheduled backups
    pub interval_minutes: u64,
}

/// Destination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Backend type. Only "local" is supported.
    #[serde(rename = "type")]
    pub kind: String,

    /// Local directory for artifacts
    pub path: Utf8PathBuf,
}

/// Retention counts per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub daily: i64,
    pub weekly: i64,
    pub monthly: i64,

    /// Weekday that marks a weekly backup (e.g. "sunday")
    #[serde(default = "default_week_boundary")]
    pub week_boundary: String,
}

fn default_week_boundary() -> String {
    "sunday".to_string()
}

/// Restore configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Parent directory for per-restore staging directories
    pub temp_dir: Utf8PathBuf,

    /// Owner applied to restored files (requires owner_gid too)
    #[serde(default)]
    pub owner_uid: Option<u32>,

    /// Group applied to restored files (requires owner_uid too)
    #[serde(default)]
    pub owner_gid: Option<u32>,
}

impl RestoreConfig {
    /// Returns the (uid, gid) pair when both are configured.
    pub fn ownership(&self) -> Option<(u32, u32)> {
        match (self.owner_uid, self.owner_gid) {
            (Some(uid), Some(gid)) => Some((uid, gid)),
            _ => None,
        }
    }
}

/// Encryption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Recipient key id passed to gpg
    #[serde(default)]
    pub gpg_key_id: String,

    /// Fail the backup (and drop the plain archive) when encryption fails
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
}

fn default_mandatory() -> bool {
    true
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gpg_key_id: String::new(),
            mandatory: true,
        }
    }
}
