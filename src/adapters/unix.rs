use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::error::RunnerError;

const COMMON_PATHS: &[&str] = &[
    "/usr/bin/rclone",
    "/usr/local/bin/rclone",
    "/opt/homebrew/bin/rclone",
];

pub(super) fn find_executable() -> Option<PathBuf> {
    for candidate in COMMON_PATHS {
        let path = Path::new(candidate);
        if is_executable(path) {
            return Some(path.to_path_buf());
        }
    }

    if let Some(home) = dirs::home_dir() {
        let path = home.join("rclone");
        if is_executable(&path) {
            return Some(path);
        }
    }

    which("rclone")
}

fn which(name: &str) -> Option<PathBuf> {
    let output = std::process::Command::new("which").arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).lines().next()?.trim());
    if path.exists() { Some(path) } else { None }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

pub(super) async fn fallback_unmount(mount_point: &Path) -> Result<(), RunnerError> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut command = Command::new("umount");
        command.arg(mount_point);
        command
    };
    #[cfg(not(target_os = "macos"))]
    let mut command = {
        let mut command = Command::new("fusermount");
        command.arg("-u").arg(mount_point);
        command
    };

    debug!(mount_point = %mount_point.display(), "platform unmount");

    let output = command.output().await.map_err(RunnerError::Launch)?;
    if output.status.success() {
        Ok(())
    } else {
        Err(RunnerError::NonZeroExit {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
