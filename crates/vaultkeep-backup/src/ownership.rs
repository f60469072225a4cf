//! Ownership and mode fix-up for restored data

use camino::Utf8Path;
use tracing::{debug, warn};

/// Mode applied to restored directories
pub const DIR_MODE: u32 = 0o700;

/// Mode applied to restored regular files
pub const FILE_MODE: u32 = 0o600;

/// Counts from one fix-up pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnershipReport {
    pub updated: usize,
    pub failures: usize,
}

/// Recursively set owner and modes under `root`.
///
/// Symlinks are re-owned but never followed or chmod-ed. Each failure is
/// logged and counted; the walk continues.
#[cfg(unix)]
pub fn fix_ownership(root: &Utf8Path, uid: u32, gid: u32) -> OwnershipReport {
    use std::fs::{self, Permissions};
    use std::os::unix::fs::{lchown, PermissionsExt};
    use walkdir::WalkDir;

    let mut report = OwnershipReport::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to walk {}: {}", root, e);
                report.failures += 1;
                continue;
            }
        };
        let path = entry.path();
        let file_type = entry.file_type();

        if let Err(e) = lchown(path, Some(uid), Some(gid)) {
            warn!("Failed to chown {}: {}", path.display(), e);
            report.failures += 1;
            continue;
        }

        let mode = if file_type.is_dir() {
            Some(DIR_MODE)
        } else if file_type.is_file() {
            Some(FILE_MODE)
        } else {
            None
        };
        if let Some(mode) = mode {
            if let Err(e) = fs::set_permissions(path, Permissions::from_mode(mode)) {
                warn!("Failed to chmod {}: {}", path.display(), e);
                report.failures += 1;
                continue;
            }
        }
        report.updated += 1;
    }

    debug!(
        "Ownership fix-up under {}: {} updated, {} failed",
        root, report.updated, report.failures
    );
    report
}

#[cfg(not(unix))]
pub fn fix_ownership(root: &Utf8Path, _uid: u32, _gid: u32) -> OwnershipReport {
    warn!("Ownership fix-up is not supported on this platform, skipping {}", root);
    OwnershipReport {
        updated: 0,
        failures: 1,
    }
}
