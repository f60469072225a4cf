//! Artifact catalog
//!
//! The catalog is a pure function of the destination directory listing and is
//! recomputed whenever it is needed. Artifacts are named `<id>.tar.gz` or
//! `<id>.tar.gz.gpg` where the id is the local capture time formatted as
//! `YYYYMMDDTHHMMSS`.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use tracing::debug;

/// Format of artifact ids
pub const ID_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Plain artifact extension
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Encrypted artifact extension
pub const ENCRYPTED_EXTENSION: &str = ".tar.gz.gpg";

/// Suffix of files still being written. Never part of the catalog.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Selector that resolves to the newest artifact
pub const LATEST: &str = "latest";

/// Sortable artifact id, second precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(NaiveDateTime);

impl ArtifactId {
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self(at.with_nanosecond(0).unwrap_or(at))
    }

    /// Parse `YYYYMMDDTHHMMSS`
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 15 || bytes[8] != b'T' {
            return None;
        }
        if !s[..8].bytes().chain(s[9..].bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let num = |range: std::ops::Range<usize>| s[range].parse::<u32>().ok();
        let date = NaiveDate::from_ymd_opt(num(0..4)? as i32, num(4..6)?, num(6..8)?)?;
        let time = NaiveTime::from_hms_opt(num(9..11)?, num(11..13)?, num(13..15)?)?;
        Some(Self(NaiveDateTime::new(date, time)))
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    /// File name of the plain artifact
    pub fn archive_file_name(&self) -> String {
        format!("{}{}", self, ARCHIVE_EXTENSION)
    }

    /// File name of the encrypted artifact
    pub fn encrypted_file_name(&self) -> String {
        format!("{}{}", self, ENCRYPTED_EXTENSION)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(ID_FORMAT))
    }
}

/// A finished backup file in the destination directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub id: ArtifactId,
    pub path: Utf8PathBuf,
    pub size_bytes: u64,
    pub encrypted: bool,
}

impl BackupArtifact {
    /// Read size from disk for an artifact path
    pub fn from_path(path: &Utf8Path) -> io::Result<Option<Self>> {
        let Some(name) = path.file_name() else {
            return Ok(None);
        };
        let Some((id, encrypted)) = parse_file_name(name) else {
            return Ok(None);
        };
        let size_bytes = fs::metadata(path)?.len();
        Ok(Some(Self {
            id,
            path: path.to_owned(),
            size_bytes,
            encrypted,
        }))
    }
}

/// Split an artifact file name into id and encryption flag
pub fn parse_file_name(name: &str) -> Option<(ArtifactId, bool)> {
    if let Some(stem) = name.strip_suffix(ENCRYPTED_EXTENSION) {
        return ArtifactId::parse(stem).map(|id| (id, true));
    }
    name.strip_suffix(ARCHIVE_EXTENSION)
        .and_then(ArtifactId::parse)
        .map(|id| (id, false))
}

/// List the artifacts in `destination`, newest first.
///
/// A missing destination is an empty catalog. Dot-files are skipped silently,
/// partial and unrecognised files with a debug log. When both a plain and an
/// encrypted file exist for one id, the encrypted one wins.
pub fn list_artifacts(destination: &Utf8Path) -> io::Result<Vec<BackupArtifact>> {
    let entries = match fs::read_dir(destination) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut by_id: BTreeMap<ArtifactId, BackupArtifact> = BTreeMap::new();
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            debug!("Skipping non UTF-8 file name {:?}", file_name);
            continue;
        };

        if name.starts_with('.') {
            continue;
        }
        if name.ends_with(PARTIAL_SUFFIX) {
            debug!("Skipping in-progress file {}", name);
            continue;
        }
        let Some((id, encrypted)) = parse_file_name(name) else {
            debug!("Skipping unrecognised file {}", name);
            continue;
        };

        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            debug!("Skipping non-file entry {}", name);
            continue;
        }

        let artifact = BackupArtifact {
            id,
            path: destination.join(name),
            size_bytes: metadata.len(),
            encrypted,
        };
        match by_id.get(&id) {
            Some(existing) if existing.encrypted => {
                debug!("Ignoring {} shadowed by {}", artifact.path, existing.path);
            }
            _ => {
                by_id.insert(id, artifact);
            }
        }
    }

    Ok(by_id.into_values().rev().collect())
}

/// Resolve `latest` or an exact id against a catalog listed newest first
pub fn resolve<'a>(artifacts: &'a [BackupArtifact], selector: &str) -> Result<&'a BackupArtifact> {
    let selector = selector.trim();
    let found = if selector.eq_ignore_ascii_case(LATEST) {
        artifacts.first()
    } else {
        artifacts.iter().find(|a| {
            a.id.to_string() == selector || a.path.file_name() == Some(selector)
        })
    };

    found.ok_or_else(|| Error::BackupNotFound {
        id: selector.to_string(),
    })
}
