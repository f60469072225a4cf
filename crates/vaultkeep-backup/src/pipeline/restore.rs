//! Restore pipeline
//!
//! Locate, stage and (optionally) decrypt the artifact, ask for confirmation,
//! stop the container, replace the target directory, fix ownership and start
//! the container again. The archive is unpacked into a scratch directory next
//! to the target and its single top-level directory is renamed onto the
//! target, so sibling directories are never touched. Deleting the target is
//! the point of no return: from there the container is always started. The
//! staging directory is removed on every exit path.

use crate::catalog::{self, BackupArtifact, LATEST};
use crate::engine::Engine;
use crate::error::{ArchiveError, Error, Result, Stage};
use crate::ownership::{fix_ownership, OwnershipReport};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What to restore and where
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    /// Artifact id or `latest`
    pub backup_id: String,
    /// Directory to replace, defaults to the configured data directory
    pub target_dir: Option<Utf8PathBuf>,
    pub skip_confirmation: bool,
}

impl RestoreRequest {
    pub fn new(backup_id: impl Into<String>) -> Self {
        Self {
            backup_id: backup_id.into(),
            target_dir: None,
            skip_confirmation: false,
        }
    }

    pub fn latest() -> Self {
        Self::new(LATEST)
    }

    pub fn with_target_dir(mut self, target_dir: impl Into<Utf8PathBuf>) -> Self {
        self.target_dir = Some(target_dir.into());
        self
    }

    pub fn with_skip_confirmation(mut self, skip: bool) -> Self {
        self.skip_confirmation = skip;
        self
    }
}

/// Shown to the operator before anything destructive happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    pub backup_id: String,
    pub size_bytes: u64,
    pub encrypted: bool,
    pub target_dir: Utf8PathBuf,
    pub container: String,
}

/// Asks whether a destructive restore may proceed. Anything but an explicit yes declines.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, summary: &RestoreSummary) -> bool;
}

/// Outcome of a successful restore
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub artifact: BackupArtifact,
    pub target_dir: Utf8PathBuf,
    /// `None` when no owner is configured
    pub ownership: Option<OwnershipReport>,
    pub duration: Duration,
}

impl Engine {
    pub async fn run_restore(
        &self,
        request: &RestoreRequest,
        confirmer: &dyn Confirmer,
    ) -> Result<RestoreReport> {
        let started = Instant::now();
        let _lock = self.lock()?;
        let settings = &self.settings;

        info!("Stage 1/7: Locating backup '{}'", request.backup_id);
        let artifacts = self.list()?;
        let artifact = catalog::resolve(&artifacts, &request.backup_id)?.clone();

        let target = request
            .target_dir
            .clone()
            .unwrap_or_else(|| settings.data_dir.clone());
        let parent = target_parent(&target)?;

        info!("Stage 2/7: Staging {}", artifact.path);
        fs::create_dir_all(&settings.temp_dir).map_err(|e| {
            Error::io(
                Stage::Staging,
                format!("Failed to create {}", settings.temp_dir),
                e,
            )
        })?;
        let staging = tempfile::Builder::new()
            .prefix("vaultkeep-restore-")
            .tempdir_in(&settings.temp_dir)
            .map_err(|e| {
                Error::io(
                    Stage::Staging,
                    format!("Failed to create staging directory in {}", settings.temp_dir),
                    e,
                )
            })?;

        let result = match Utf8Path::from_path(staging.path()) {
            Some(staging_dir) => {
                self.restore_staged(&artifact, &target, &parent, staging_dir, request, confirmer)
                    .await
            }
            None => Err(Error::io(
                Stage::Staging,
                format!("Staging path {:?} is not UTF-8", staging.path()),
                io::Error::from(io::ErrorKind::InvalidData),
            )),
        };

        info!("Stage 7/7: Cleaning up staging directory");
        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            warn!(
                "Failed to remove staging directory {}: {}",
                staging_path.display(),
                e
            );
        }

        let ownership = result?;
        let duration = started.elapsed();
        info!(
            "Restore of {} into {} complete ({:.1}s)",
            artifact.id,
            target,
            duration.as_secs_f64()
        );

        Ok(RestoreReport {
            artifact,
            target_dir: target,
            ownership,
            duration,
        })
    }

    async fn restore_staged(
        &self,
        artifact: &BackupArtifact,
        target: &Utf8Path,
        parent: &Utf8Path,
        staging_dir: &Utf8Path,
        request: &RestoreRequest,
        confirmer: &dyn Confirmer,
    ) -> Result<Option<OwnershipReport>> {
        let settings = &self.settings;

        let staged = staging_dir.join(artifact.path.file_name().unwrap_or("artifact"));
        fs::copy(&artifact.path, &staged).map_err(|e| {
            Error::io(Stage::Staging, format!("Failed to copy {}", artifact.path), e)
        })?;

        let archive = if artifact.encrypted {
            info!("Stage 3/7: Decrypting {}", staged);
            self.encryptor
                .decrypt(&staged)
                .await
                .map_err(|e| Error::encryption(Stage::Decrypting, e))?
        } else {
            staged
        };

        if !request.skip_confirmation {
            let summary = RestoreSummary {
                backup_id: artifact.id.to_string(),
                size_bytes: artifact.size_bytes,
                encrypted: artifact.encrypted,
                target_dir: target.to_owned(),
                container: settings.container.to_string(),
            };
            if !confirmer.confirm(&summary) {
                info!("Restore of {} declined", artifact.id);
                return Err(Error::ConfirmationDeclined);
            }
        }

        if !settings.skip_start_stop {
            info!("Stage 4/7: Stopping container '{}'", settings.container);
            self.controller
                .stop(&settings.container)
                .await
                .map_err(|e| Error::container(Stage::Stopping, e))?;
        }

        let replaced = self.replace_target(&archive, target, parent).await;

        let restarted = if settings.skip_start_stop {
            Ok(())
        } else {
            info!("Stage 6/7: Starting container '{}'", settings.container);
            self.controller.start(&settings.container).await
        };

        match (replaced, restarted) {
            (Ok(ownership), Ok(())) => Ok(ownership),
            (Ok(_), Err(e)) => Err(Error::container(Stage::Starting, e)),
            (Err(e), Ok(())) => {
                error!(
                    "Restore into {} failed; container '{}' was started again",
                    target, settings.container
                );
                Err(e)
            }
            (Err(e), Err(start_err)) => {
                error!(
                    "Restore into {} failed and container '{}' failed to start: {}",
                    target, settings.container, start_err
                );
                Err(e)
            }
        }
    }

    /// Delete the target, extract into a scratch directory beside it, move the
    /// extracted tree into place and fix ownership
    async fn replace_target(
        &self,
        archive: &Utf8Path,
        target: &Utf8Path,
        parent: &Utf8Path,
    ) -> Result<Option<OwnershipReport>> {
        info!("Stage 5/7: Replacing {}", target);
        let scratch = tempfile::Builder::new()
            .prefix(".vaultkeep-extract-")
            .tempdir_in(parent)
            .map_err(|e| {
                Error::io(
                    Stage::Deleting,
                    format!("Failed to create extraction directory in {}", parent),
                    e,
                )
            })?;

        match fs::remove_dir_all(target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::io(
                    Stage::Deleting,
                    format!("Failed to delete {}", target),
                    e,
                ))
            }
        }

        let moved = match Utf8Path::from_path(scratch.path()) {
            Some(scratch_dir) => self.extract_into_place(archive, scratch_dir, target).await,
            None => Err(Error::io(
                Stage::Extracting,
                format!("Extraction path {:?} is not UTF-8", scratch.path()),
                io::Error::from(io::ErrorKind::InvalidData),
            )),
        };

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(
                "Failed to remove extraction directory {}: {}",
                scratch_path.display(),
                e
            );
        }
        moved?;

        let ownership = self.settings.ownership.map(|(uid, gid)| {
            info!("Setting ownership of {} to {}:{}", target, uid, gid);
            let report = fix_ownership(target, uid, gid);
            if report.failures > 0 {
                warn!(
                    "Ownership fix-up left {} entries unchanged under {}",
                    report.failures, target
                );
            }
            report
        });

        Ok(ownership)
    }

    async fn extract_into_place(
        &self,
        archive: &Utf8Path,
        scratch_dir: &Utf8Path,
        target: &Utf8Path,
    ) -> Result<()> {
        self.codec
            .extract_archive(archive, scratch_dir)
            .await
            .map_err(|e| Error::archive(Stage::Extracting, e))?;

        let extracted = single_top_level_dir(archive, scratch_dir)?;
        debug!("Moving {} to {}", extracted, target);
        fs::rename(&extracted, target).map_err(|e| {
            Error::io(
                Stage::Extracting,
                format!("Failed to move restored data into {}", target),
                e,
            )
        })
    }
}

/// The one directory an archive unpacked into `dir`
fn single_top_level_dir(archive: &Utf8Path, dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let entries = dir
        .read_dir_utf8()
        .and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
        .map_err(|e| Error::io(Stage::Extracting, format!("Failed to read {}", dir), e))?;

    match entries.as_slice() {
        [entry] if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) => {
            Ok(entry.path().to_owned())
        }
        _ => Err(Error::archive(
            Stage::Extracting,
            ArchiveError::corrupt(
                archive,
                format!(
                    "expected a single top-level directory, found {} entries",
                    entries.len()
                ),
            ),
        )),
    }
}

/// Parent of the restore target, which must already exist
fn target_parent(target: &Utf8Path) -> Result<Utf8PathBuf> {
    let parent = match (target.parent(), target.file_name()) {
        (Some(parent), Some(_)) if !parent.as_str().is_empty() => parent,
        _ => {
            return Err(Error::io(
                Stage::Locating,
                format!("Invalid restore target {}", target),
                io::Error::from(io::ErrorKind::InvalidInput),
            ))
        }
    };

    if !parent.is_dir() {
        return Err(Error::io(
            Stage::Locating,
            format!("Parent directory of restore target {} does not exist", target),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }
    Ok(parent.to_owned())
}
