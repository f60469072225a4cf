//! Error types for backup and restore runs

use camino::Utf8PathBuf;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use vaultkeep_providers::ContainerError;

/// Result type alias using vaultkeep-backup's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline step an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Locking,
    Stopping,
    Archiving,
    Encrypting,
    Starting,
    Retention,
    Locating,
    Staging,
    Decrypting,
    Confirming,
    Deleting,
    Extracting,
    FixingOwnership,
    CleaningUp,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Locking => "locking",
            Stage::Stopping => "stopping",
            Stage::Archiving => "archiving",
            Stage::Encrypting => "encrypting",
            Stage::Starting => "starting",
            Stage::Retention => "retention",
            Stage::Locating => "locating",
            Stage::Staging => "staging",
            Stage::Decrypting => "decrypting",
            Stage::Confirming => "confirming",
            Stage::Deleting => "deleting",
            Stage::Extracting => "extracting",
            Stage::FixingOwnership => "fixing ownership",
            Stage::CleaningUp => "cleaning up",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a backup, restore or prune run
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Configuration(#[from] vaultkeep_core::Error),

    /// The container runtime failed to stop, start or report the container
    #[error("Container control failed while {stage}: {source}")]
    ContainerControl {
        stage: Stage,
        #[source]
        source: ContainerError,
    },

    /// Creating or extracting the archive failed
    #[error("Archive error while {stage}: {source}")]
    Archive {
        stage: Stage,
        #[source]
        source: ArchiveError,
    },

    /// Encrypting or decrypting the artifact failed
    #[error("Encryption error while {stage}: {source}")]
    Encryption {
        stage: Stage,
        #[source]
        source: EncryptionError,
    },

    /// Retention could not be evaluated. Never fails a backup.
    #[error("Retention error: {message}")]
    Retention { message: String },

    /// Another run holds the operation lock
    #[error("Another vaultkeep operation is in progress ({holder}), lock file {path}")]
    OperationInProgress { path: Utf8PathBuf, holder: String },

    /// The operator did not confirm a destructive restore
    #[error("Restore cancelled at confirmation")]
    ConfirmationDeclined,

    /// No artifact matches the requested id
    #[error("Backup not found: {id}")]
    BackupNotFound { id: String },

    /// Filesystem error outside the codec
    #[error("{context} while {stage}: {source}")]
    Io {
        stage: Stage,
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn container(stage: Stage, source: ContainerError) -> Self {
        Self::ContainerControl { stage, source }
    }

    pub fn archive(stage: Stage, source: ArchiveError) -> Self {
        Self::Archive { stage, source }
    }

    pub fn encryption(stage: Stage, source: EncryptionError) -> Self {
        Self::Encryption { stage, source }
    }

    pub fn io(stage: Stage, context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            stage,
            context: context.into(),
            source,
        }
    }

    /// Step the error was raised in, when it happened inside a pipeline
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::ContainerControl { stage, .. }
            | Error::Archive { stage, .. }
            | Error::Encryption { stage, .. }
            | Error::Io { stage, .. } => Some(*stage),
            Error::Retention { .. } => Some(Stage::Retention),
            Error::OperationInProgress { .. } => Some(Stage::Locking),
            Error::ConfirmationDeclined => Some(Stage::Confirming),
            Error::BackupNotFound { .. } => Some(Stage::Locating),
            Error::Configuration(_) => None,
        }
    }
}

/// Archive codec errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The directory to archive does not exist
    #[error("Source directory missing: {path}")]
    SourceMissing { path: Utf8PathBuf },

    /// Reading or writing failed
    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination filesystem filled up while archiving
    #[error("Disk full while writing {path}")]
    DiskFull { path: Utf8PathBuf },

    /// The archive could not be read back
    #[error("Corrupt archive {path}: {message}")]
    CorruptArchive { path: Utf8PathBuf, message: String },

    /// The target filesystem filled up while extracting
    #[error("Insufficient space extracting into {path}")]
    InsufficientSpace { path: Utf8PathBuf },

    /// The codec call ran past its time limit
    #[error("Archive operation on {path} timed out after {}s", .timeout.as_secs())]
    TimedOut { path: Utf8PathBuf, timeout: Duration },
}

impl ArchiveError {
    pub fn corrupt(path: impl Into<Utf8PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// gpg errors
#[derive(Error, Debug)]
pub enum EncryptionError {
    /// The recipient (or secret) key is not in the keyring
    #[error("Key not found: {key}: {message}")]
    KeyNotFound { key: String, message: String },

    /// Encryption ran but failed
    #[error("Encryption failed: {message}")]
    EncryptionFailed { message: String },

    /// Decryption ran but failed
    #[error("Decryption failed: {message}")]
    DecryptionFailed { message: String },
}
