//! VFS cache directory inspection and cleanup.
//!
//! The supervisor first asks rclone itself to drop its VFS cache
//! (`rc vfs/forget`); this module is the manual fallback that sweeps the
//! cache directory on disk when no rc server is listening.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

/// Outcome of a manual cache sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub files_removed: u64,
    pub dirs_removed: u64,
}

/// Total size of all regular files under `path`. Symlinks are not followed
/// and unreadable entries are skipped.
pub fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Best-effort removal of everything under the cache directory.
///
/// Contents-first traversal, so directories are already empty when their
/// turn comes. Entries that cannot be removed are skipped; the cache
/// directory itself is kept.
pub fn clean(path: &Path) -> CleanReport {
    let mut report = CleanReport::default();

    for entry in WalkDir::new(path)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.path() == path {
            continue;
        }
        if entry.file_type().is_dir() {
            match std::fs::remove_dir(entry.path()) {
                Ok(()) => report.dirs_removed += 1,
                Err(error) => debug!(path = %entry.path().display(), %error, "skipped directory"),
            }
        } else {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => report.files_removed += 1,
                Err(error) => debug!(path = %entry.path().display(), %error, "skipped file"),
            }
        }
    }

    report
}

/// Human-readable byte count, 1024-based.
pub fn format_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut index = 0;
    while size >= 1024.0 && index < SUFFIXES.len() - 1 {
        size /= 1024.0;
        index += 1;
    }

    format!("{:.2} {}", size, SUFFIXES[index])
}
