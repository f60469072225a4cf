//! Vaultkeep backup engine
//!
//! Consistent point-in-time backups and destructive restores of an
//! application's data directory while the application runs in a container.
//!
//! # Features
//!
//! ## Backup
//! - **Quiesce first**: the container is stopped for the capture and started exactly once afterwards
//! - **Atomic artifacts**: tar+gzip written under a `.partial` name and renamed when complete
//! - **Optional gpg encryption**: mandatory or best-effort
//! - **Multi-tier retention**: daily, weekly and monthly tiers over the artifact catalog
//!
//! ## Restore
//! - **Staged**: the artifact is copied and decrypted in a scoped temp directory
//! - **Confirmed**: nothing destructive happens before an explicit yes
//! - **Always restarts**: once the target is deleted, the container is started on every path
//! - **Ownership fix-up**: optional uid/gid and restrictive modes on restored data
//!
//! Every run holds an exclusive lock keyed by container name and data path.
//!
//! # Examples
//!
//! ```no_run
//! use camino::Utf8Path;
//! use vaultkeep_backup::run_backup;
//! use vaultkeep_core::VaultkeepConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VaultkeepConfig::load(Utf8Path::new("/etc/vaultkeep/vaultkeep.yaml"))?;
//!     let report = run_backup(&config).await?;
//!     println!("Backup created: {} ({} bytes)", report.artifact.path, report.artifact.size_bytes);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod catalog;
pub mod checksum;
pub mod encryption;
pub mod engine;
pub mod error;
pub mod lock;
pub mod ownership;
pub mod pipeline;
pub mod retention;
pub mod scheduler;

// Re-export commonly used types
pub use archive::{ArchiveCodec, ArchiveResult, TarGzCodec, TimeLimitedCodec};
pub use catalog::{list_artifacts, ArtifactId, BackupArtifact, LATEST};
pub use checksum::calculate_checksum;
pub use encryption::{Encryptor, GpgEncryptor};
pub use engine::{run_backup, run_restore, run_scheduler, Engine, EngineSettings};
pub use error::{ArchiveError, EncryptionError, Error, Result, Stage};
pub use lock::OperationLock;
pub use ownership::{fix_ownership, OwnershipReport};
pub use pipeline::{BackupReport, Confirmer, RestoreReport, RestoreRequest, RestoreSummary};
pub use retention::{RetentionPlan, RetentionPolicy, RetentionReport};
pub use scheduler::SchedulerStats;
