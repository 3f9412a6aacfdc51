//! Platform-specific shell-outs.
//!
//! Two concerns live here: finding the rclone executable in the usual
//! install locations, and the fallback unmount used when a mount's
//! supervisor entry is already gone (e.g. after a restart of this program
//! while the mount process kept running).

use std::path::{Path, PathBuf};

use crate::error::RunnerError;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix as platform;
#[cfg(windows)]
use windows as platform;

/// Probe common install locations and the system PATH for rclone.
pub fn find_executable() -> Option<PathBuf> {
    platform::find_executable()
}

/// Unmount a mount point with the platform's own tooling.
pub async fn fallback_unmount(mount_point: &Path) -> Result<(), RunnerError> {
    platform::fallback_unmount(mount_point).await
}
