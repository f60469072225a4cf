//! Backup pipeline: stop, archive, encrypt, start, enforce retention

use crate::catalog::{ArtifactId, BackupArtifact};
use crate::checksum::calculate_checksum;
use crate::engine::Engine;
use crate::error::{ArchiveError, Error, Result, Stage};
use crate::retention::{self, RetentionReport};
use chrono::NaiveDateTime;
use std::fs;
use std::io;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Outcome of a successful backup
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub artifact: BackupArtifact,
    /// Encryption was configured but failed and the plain archive was kept
    pub degraded: bool,
    /// SHA-256 of the final artifact, `None` if it could not be read back
    pub checksum: Option<String>,
    /// `None` when retention could not be evaluated
    pub retention: Option<RetentionReport>,
    pub duration: Duration,
}

impl Engine {
    /// Take a backup stamped with the current local time
    pub async fn run_backup(&self) -> Result<BackupReport> {
        let at = self.now();
        self.run_backup_at(at).await
    }

    /// Take a backup stamped with `at`
    pub async fn run_backup_at(&self, at: NaiveDateTime) -> Result<BackupReport> {
        let started = Instant::now();
        let _lock = self.lock()?;
        let settings = &self.settings;
        let id = ArtifactId::from_datetime(at);

        info!("Starting backup {} of {}", id, settings.data_dir);
        self.prepare_destination(id)?;

        if !settings.skip_start_stop {
            info!("Stage 1/4: Stopping container '{}'", settings.container);
            self.controller
                .stop(&settings.container)
                .await
                .map_err(|e| Error::container(Stage::Stopping, e))?;
        }

        let captured = self.capture(id).await;

        let restarted = if settings.skip_start_stop {
            Ok(())
        } else {
            info!("Stage 4/4: Starting container '{}'", settings.container);
            self.controller.start(&settings.container).await
        };

        let (artifact, degraded) = match (captured, restarted) {
            (Ok(captured), Ok(())) => captured,
            (Ok((artifact, _)), Err(e)) => {
                error!(
                    "Backup {} was written but container '{}' failed to start",
                    artifact.path, settings.container
                );
                return Err(Error::container(Stage::Starting, e));
            }
            (Err(e), Ok(())) => return Err(e),
            (Err(e), Err(start_err)) => {
                error!(
                    "Container '{}' failed to start after a failed backup: {}",
                    settings.container, start_err
                );
                return Err(e);
            }
        };

        let checksum = match calculate_checksum(&artifact.path) {
            Ok(sum) => Some(sum),
            Err(e) => {
                warn!("Failed to checksum {}: {}", artifact.path, e);
                None
            }
        };

        info!("Applying retention policy");
        let retention = match retention::enforce(&settings.destination, &settings.retention) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };

        let duration = started.elapsed();
        info!(
            "Backup complete: {} ({} bytes, {:.1}s)",
            artifact.path,
            artifact.size_bytes,
            duration.as_secs_f64()
        );

        Ok(BackupReport {
            artifact,
            degraded,
            checksum,
            retention,
            duration,
        })
    }

    /// Create the destination and refuse to reuse an id. Runs before the container is touched.
    fn prepare_destination(&self, id: ArtifactId) -> Result<()> {
        let destination = &self.settings.destination;
        fs::create_dir_all(destination).map_err(|e| {
            Error::archive(
                Stage::Archiving,
                ArchiveError::WriteFailed {
                    path: destination.clone(),
                    source: e,
                },
            )
        })?;

        for name in [id.archive_file_name(), id.encrypted_file_name()] {
            let path = destination.join(name);
            if path.exists() {
                return Err(Error::archive(
                    Stage::Archiving,
                    ArchiveError::WriteFailed {
                        path,
                        source: io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            format!("backup {} already exists", id),
                        ),
                    },
                ));
            }
        }
        Ok(())
    }

    /// Archive and optionally encrypt. Returns the artifact and whether it is degraded.
    async fn capture(&self, id: ArtifactId) -> Result<(BackupArtifact, bool)> {
        let settings = &self.settings;
        let dest = settings.destination.join(id.archive_file_name());

        info!("Stage 2/4: Archiving {}", settings.data_dir);
        let archived = self
            .codec
            .create_archive(&settings.data_dir, &dest)
            .await
            .map_err(|e| Error::archive(Stage::Archiving, e))?;

        let mut artifact = BackupArtifact {
            id,
            path: archived.path,
            size_bytes: archived.size_bytes,
            encrypted: false,
        };
        let mut degraded = false;

        if let Some(key) = &settings.encryption_key {
            info!("Stage 3/4: Encrypting with key {}", key);
            match self.encryptor.encrypt(&artifact.path, key).await {
                Ok(encrypted) => {
                    artifact.size_bytes = fs::metadata(&encrypted)
                        .map(|m| m.len())
                        .unwrap_or(artifact.size_bytes);
                    artifact.path = encrypted;
                    artifact.encrypted = true;
                }
                Err(e) if settings.encryption_mandatory => {
                    if let Err(rm) = fs::remove_file(&artifact.path) {
                        warn!("Failed to remove unencrypted {}: {}", artifact.path, rm);
                    }
                    return Err(Error::encryption(Stage::Encrypting, e));
                }
                Err(e) => {
                    warn!(
                        "Encryption failed, keeping unencrypted backup {}: {}",
                        artifact.path, e
                    );
                    degraded = true;
                }
            }
        }

        Ok((artifact, degraded))
    }
}
