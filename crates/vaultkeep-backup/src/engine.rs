//! Engine wiring: settings derived from the configuration plus the
//! collaborators every pipeline runs against.

use crate::archive::{ArchiveCodec, TarGzCodec, TimeLimitedCodec};
use crate::catalog::{self, BackupArtifact};
use crate::encryption::{Encryptor, GpgEncryptor};
use crate::error::{Error, Result, Stage};
use crate::lock::OperationLock;
use crate::pipeline::{BackupReport, Confirmer, RestoreReport, RestoreRequest};
use crate::retention::{self, RetentionPolicy, RetentionReport};
use crate::scheduler::SchedulerStats;
use camino::Utf8PathBuf;
use chrono::{Local, NaiveDateTime};
use std::future::Future;
use std::time::Duration;
use tracing::info;
use vaultkeep_core::VaultkeepConfig;
use vaultkeep_providers::{create_controller, ContainerController, ContainerHandle, SystemCommandRunner};

/// Everything a run needs from the configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub container: ContainerHandle,
    pub data_dir: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub lock_dir: Utf8PathBuf,
    pub temp_dir: Utf8PathBuf,
    pub skip_start_stop: bool,
    /// Recipient key when encryption is enabled
    pub encryption_key: Option<String>,
    pub encryption_mandatory: bool,
    pub retention: RetentionPolicy,
    /// (uid, gid) applied to restored data
    pub ownership: Option<(u32, u32)>,
    pub schedule_interval: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &VaultkeepConfig) -> Self {
        Self {
            container: ContainerHandle::new(config.container_name()),
            data_dir: config.data_dir().to_owned(),
            destination: config.destination().to_owned(),
            lock_dir: config.lock_dir().to_owned(),
            temp_dir: config.restore_temp_dir().to_owned(),
            skip_start_stop: config.skip_start_stop(),
            encryption_key: config.encryption_key().map(str::to_string),
            encryption_mandatory: config.encryption_mandatory(),
            retention: RetentionPolicy::from_config(config),
            ownership: config.restore_ownership(),
            schedule_interval: config.schedule_interval(),
        }
    }
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Backup/restore engine
pub struct Engine {
    pub(crate) settings: EngineSettings,
    pub(crate) controller: Box<dyn ContainerController>,
    pub(crate) codec: Box<dyn ArchiveCodec>,
    pub(crate) encryptor: Box<dyn Encryptor>,
    clock: Clock,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        controller: Box<dyn ContainerController>,
        codec: Box<dyn ArchiveCodec>,
        encryptor: Box<dyn Encryptor>,
    ) -> Self {
        Self {
            settings,
            controller,
            codec,
            encryptor,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Engine backed by Docker, tar+gzip and gpg
    pub fn from_config(config: &VaultkeepConfig) -> Self {
        let timeout = config.command_timeout();
        let tar_gz = TarGzCodec::new().with_compression_level(config.compression_level());
        let codec: Box<dyn ArchiveCodec> = match config.archive_timeout() {
            Some(limit) => Box::new(TimeLimitedCodec::new(tar_gz, limit)),
            None => Box::new(tar_gz),
        };
        Self::new(
            EngineSettings::from_config(config),
            create_controller(timeout),
            codec,
            Box::new(GpgEncryptor::new(SystemCommandRunner::new(timeout))),
        )
    }

    /// Replace the source of artifact timestamps
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub(crate) fn lock(&self) -> Result<OperationLock> {
        OperationLock::acquire(
            &self.settings.lock_dir,
            &self.settings.container.name,
            &self.settings.data_dir,
        )
    }

    /// Current catalog, newest first
    pub fn list(&self) -> Result<Vec<BackupArtifact>> {
        catalog::list_artifacts(&self.settings.destination).map_err(|e| {
            Error::io(
                Stage::Locating,
                format!("Failed to list {}", self.settings.destination),
                e,
            )
        })
    }

    /// Apply the retention policy without taking a backup
    pub fn prune(&self) -> Result<RetentionReport> {
        let _lock = self.lock()?;
        info!("Applying retention policy to {}", self.settings.destination);
        retention::enforce(&self.settings.destination, &self.settings.retention)
    }
}

/// Run one backup with the given configuration
pub async fn run_backup(config: &VaultkeepConfig) -> Result<BackupReport> {
    Engine::from_config(config).run_backup().await
}

/// Run one restore with the given configuration
pub async fn run_restore(
    config: &VaultkeepConfig,
    request: &RestoreRequest,
    confirmer: &dyn Confirmer,
) -> Result<RestoreReport> {
    Engine::from_config(config).run_restore(request, confirmer).await
}

/// Run scheduled backups until `shutdown` resolves
pub async fn run_scheduler<F>(config: &VaultkeepConfig, shutdown: F) -> Result<SchedulerStats>
where
    F: Future<Output = ()>,
{
    Engine::from_config(config).run_scheduler(shutdown).await
}
