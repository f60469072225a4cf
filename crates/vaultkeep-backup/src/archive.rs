//! Archive creation and extraction.
//!
//! An archive is one gzip-compressed tar holding a single top-level directory
//! named after the source directory. Relative paths, modes and symlinks are
//! preserved. Archives are written under a `.partial` name next to the
//! destination and renamed once the stream is closed and synced.
//!
//! [`TimeLimitedCodec`] bounds any codec call. When a [`TarGzCodec`] call is
//! abandoned, its blocking worker stops at the next read or write and removes
//! what it was writing.

use crate::catalog::PARTIAL_SUFFIX;
use crate::error::ArchiveError;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tar::{Archive, Builder as TarBuilder};
use tracing::{debug, warn};
use vaultkeep_core::types::DEFAULT_COMPRESSION_LEVEL;

/// Result of creating an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResult {
    pub path: Utf8PathBuf,
    pub size_bytes: u64,
}

/// Creates and extracts directory archives
#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Archive `source_dir` into `dest_path`
    async fn create_archive(
        &self,
        source_dir: &Utf8Path,
        dest_path: &Utf8Path,
    ) -> Result<ArchiveResult, ArchiveError>;

    /// Extract `archive` into `dest_parent`, recreating its top-level directory
    async fn extract_archive(
        &self,
        archive: &Utf8Path,
        dest_parent: &Utf8Path,
    ) -> Result<(), ArchiveError>;
}

/// tar + gzip codec
#[derive(Debug, Clone, Copy)]
pub struct TarGzCodec {
    compression_level: u32,
}

impl Default for TarGzCodec {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl TarGzCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression level.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.clamp(1, 9);
        self
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }
}

#[async_trait]
impl ArchiveCodec for TarGzCodec {
    async fn create_archive(
        &self,
        source_dir: &Utf8Path,
        dest_path: &Utf8Path,
    ) -> Result<ArchiveResult, ArchiveError> {
        let source = source_dir.to_owned();
        let dest = dest_path.to_owned();
        let level = self.compression_level;
        let guard = CancelOnDrop::new();
        let cancel = guard.flag();

        let result =
            tokio::task::spawn_blocking(move || create_blocking(&source, &dest, level, &cancel))
                .await
                .map_err(|e| ArchiveError::WriteFailed {
                    path: dest_path.to_owned(),
                    source: io::Error::other(e),
                })?;
        guard.disarm();
        result
    }

    async fn extract_archive(
        &self,
        archive: &Utf8Path,
        dest_parent: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        let archive_path = archive.to_owned();
        let parent = dest_parent.to_owned();
        let guard = CancelOnDrop::new();
        let cancel = guard.flag();

        let result =
            tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &parent, &cancel))
                .await
                .map_err(|e| ArchiveError::WriteFailed {
                    path: dest_parent.to_owned(),
                    source: io::Error::other(e),
                })?;
        guard.disarm();
        result
    }
}

/// Fails codec calls that run longer than a fixed limit
pub struct TimeLimitedCodec<C> {
    inner: C,
    limit: Duration,
}

impl<C: ArchiveCodec> TimeLimitedCodec<C> {
    pub fn new(inner: C, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<C: ArchiveCodec> ArchiveCodec for TimeLimitedCodec<C> {
    async fn create_archive(
        &self,
        source_dir: &Utf8Path,
        dest_path: &Utf8Path,
    ) -> Result<ArchiveResult, ArchiveError> {
        match tokio::time::timeout(self.limit, self.inner.create_archive(source_dir, dest_path)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("Archiving {} exceeded {:?}", source_dir, self.limit);
                Err(ArchiveError::TimedOut {
                    path: dest_path.to_owned(),
                    timeout: self.limit,
                })
            }
        }
    }

    async fn extract_archive(
        &self,
        archive: &Utf8Path,
        dest_parent: &Utf8Path,
    ) -> Result<(), ArchiveError> {
        match tokio::time::timeout(self.limit, self.inner.extract_archive(archive, dest_parent)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("Extracting {} exceeded {:?}", archive, self.limit);
                Err(ArchiveError::TimedOut {
                    path: archive.to_owned(),
                    timeout: self.limit,
                })
            }
        }
    }
}

/// Raises the cancel flag when the owning future is dropped before completion
struct CancelOnDrop {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl CancelOnDrop {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            armed: true,
        }
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

fn cancelled_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "archive operation cancelled")
}

/// Reader/writer that fails once the cancel flag is raised
struct Cancellable<T> {
    inner: T,
    cancel: Arc<AtomicBool>,
}

impl<T> Cancellable<T> {
    fn new(inner: T, cancel: &Arc<AtomicBool>) -> Self {
        Self {
            inner,
            cancel: Arc::clone(cancel),
        }
    }

    fn check(&self) -> io::Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(cancelled_error())
        } else {
            Ok(())
        }
    }

    fn into_inner(self) -> T {
        self.inner
    }
}

impl<R: Read> Read for Cancellable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.read(buf)
    }
}

impl<W: Write> Write for Cancellable<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

fn create_blocking(
    source_dir: &Utf8Path,
    dest_path: &Utf8Path,
    level: u32,
    cancel: &Arc<AtomicBool>,
) -> Result<ArchiveResult, ArchiveError> {
    let base_name = match source_dir.file_name() {
        Some(name) if source_dir.is_dir() => name.to_string(),
        _ => {
            return Err(ArchiveError::SourceMissing {
                path: source_dir.to_owned(),
            })
        }
    };

    let partial = Utf8PathBuf::from(format!("{}{}", dest_path, PARTIAL_SUFFIX));
    debug!("Archiving {} into {}", source_dir, partial);

    let written = write_tar_gz(source_dir, &base_name, &partial, level, cancel).and_then(|()| {
        if cancel.load(Ordering::SeqCst) {
            Err(cancelled_error())
        } else {
            Ok(())
        }
    });
    if let Err(e) = written {
        if let Err(rm) = fs::remove_file(&partial) {
            if rm.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove partial archive {}: {}", partial, rm);
            }
        }
        return Err(classify_write_error(dest_path, e));
    }

    fs::rename(&partial, dest_path).map_err(|e| classify_write_error(dest_path, e))?;
    let size_bytes = fs::metadata(dest_path)
        .map_err(|e| classify_write_error(dest_path, e))?
        .len();

    Ok(ArchiveResult {
        path: dest_path.to_owned(),
        size_bytes,
    })
}

fn write_tar_gz(
    source_dir: &Utf8Path,
    base_name: &str,
    output: &Utf8Path,
    level: u32,
    cancel: &Arc<AtomicBool>,
) -> io::Result<()> {
    let file = File::create(output)?;
    let writer = Cancellable::new(BufWriter::new(file), cancel);
    let encoder = GzEncoder::new(writer, Compression::new(level));
    let mut tar = TarBuilder::new(encoder);
    tar.follow_symlinks(false);
    tar.append_dir_all(base_name, source_dir)?;

    let encoder = tar.into_inner()?;
    let writer = encoder.finish()?.into_inner();
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

fn classify_write_error(path: &Utf8Path, e: io::Error) -> ArchiveError {
    if is_out_of_space(&e) {
        ArchiveError::DiskFull {
            path: path.to_owned(),
        }
    } else {
        ArchiveError::WriteFailed {
            path: path.to_owned(),
            source: e,
        }
    }
}

fn extract_blocking(
    archive: &Utf8Path,
    dest_parent: &Utf8Path,
    cancel: &Arc<AtomicBool>,
) -> Result<(), ArchiveError> {
    let file = File::open(archive)
        .map_err(|e| ArchiveError::corrupt(archive, format!("cannot open: {}", e)))?;
    fs::create_dir_all(dest_parent).map_err(|e| ArchiveError::WriteFailed {
        path: dest_parent.to_owned(),
        source: e,
    })?;

    debug!("Extracting {} into {}", archive, dest_parent);
    let reader = BufReader::new(Cancellable::new(file, cancel));
    let mut tar = Archive::new(GzDecoder::new(reader));
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);
    tar.unpack(dest_parent).map_err(|e| {
        if cancel.load(Ordering::SeqCst) {
            ArchiveError::WriteFailed {
                path: dest_parent.to_owned(),
                source: e,
            }
        } else if is_out_of_space(&e) {
            ArchiveError::InsufficientSpace {
                path: dest_parent.to_owned(),
            }
        } else if e.kind() == io::ErrorKind::PermissionDenied {
            ArchiveError::WriteFailed {
                path: dest_parent.to_owned(),
                source: e,
            }
        } else {
            ArchiveError::corrupt(archive, e.to_string())
        }
    })
}

fn is_out_of_space(e: &io::Error) -> bool {
    // ENOSPC
    e.kind() == io::ErrorKind::StorageFull || e.raw_os_error() == Some(28)
}
