//! Exclusive operation lock
//!
//! One lock file per configuration identity (container name + data path),
//! held with an advisory exclusive lock for the whole run. The file carries the
//! owner pid and acquisition time so contention can name the holder. The OS
//! drops advisory locks with the process, so a lock file left by a crashed run
//! is simply re-acquired; its stale metadata is logged and overwritten.

use crate::error::{Error, Result, Stage};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{debug, info, warn};

/// Metadata written into a held lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub key: String,
}

/// Held operation lock, released on drop
#[derive(Debug)]
pub struct OperationLock {
    file: File,
    path: Utf8PathBuf,
}

impl OperationLock {
    /// Lock file path for a configuration identity
    pub fn lock_path(lock_dir: &Utf8Path, container_name: &str, data_dir: &Utf8Path) -> Utf8PathBuf {
        lock_dir.join(format!(".vaultkeep-{}.lock", lock_key(container_name, data_dir)))
    }

    /// Take the lock or fail fast with `OperationInProgress`
    pub fn acquire(lock_dir: &Utf8Path, container_name: &str, data_dir: &Utf8Path) -> Result<Self> {
        fs::create_dir_all(lock_dir)
            .map_err(|e| Error::io(Stage::Locking, format!("Failed to create {}", lock_dir), e))?;

        let path = Self::lock_path(lock_dir, container_name, data_dir);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io(Stage::Locking, format!("Failed to open {}", path), e))?;

        let locked = match FileExt::try_lock_exclusive(&file) {
            Ok(locked) => locked,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) => {
                return Err(Error::io(Stage::Locking, format!("Failed to lock {}", path), e));
            }
        };

        if !locked {
            let holder = match read_info(&mut file) {
                Some(info) => format!("pid {} since {}", info.pid, info.acquired_at.to_rfc3339()),
                None => "unknown holder".to_string(),
            };
            return Err(Error::OperationInProgress { path, holder });
        }

        if let Some(previous) = read_info(&mut file) {
            if previous.pid != std::process::id() && !process_alive(previous.pid) {
                info!(
                    "Reclaimed stale lock {} left by pid {} at {}",
                    path,
                    previous.pid,
                    previous.acquired_at.to_rfc3339()
                );
            }
        }

        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            key: format!("{}:{}", container_name, data_dir),
        };
        write_info(&mut file, &info)
            .map_err(|e| Error::io(Stage::Locking, format!("Failed to write {}", path), e))?;

        debug!("Acquired operation lock {}", path);
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            debug!("Failed to clear lock file {}: {}", self.path, e);
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path, e);
        } else {
            debug!("Released operation lock {}", self.path);
        }
    }
}

fn lock_key(container_name: &str, data_dir: &Utf8Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(container_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(data_dir.as_str().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn read_info(file: &mut File) -> Option<LockInfo> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    serde_json::from_str(content.trim()).ok()
}

fn write_info(file: &mut File, info: &LockInfo) -> io::Result<()> {
    let json = serde_json::to_string(info).map_err(io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.sync_all()
}

/// Whether a pid belongs to a live process. Assumes alive where /proc is unavailable.
fn process_alive(pid: u32) -> bool {
    let proc_root = Utf8Path::new("/proc");
    if !proc_root.join("self").exists() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}
