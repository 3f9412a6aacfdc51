use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::error::RunnerError;

const COMMON_PATHS: &[&str] = &[
    "C:\\rclone\\rclone.exe",
    "C:\\Program Files\\rclone\\rclone.exe",
];

pub(super) fn find_executable() -> Option<PathBuf> {
    for candidate in COMMON_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    if let Some(home) = dirs::home_dir() {
        let path = home.join("rclone").join("rclone.exe");
        if path.exists() {
            return Some(path);
        }
    }

    where_exe("rclone.exe")
}

fn where_exe(name: &str) -> Option<PathBuf> {
    let output = std::process::Command::new("where").arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).lines().next()?.trim());
    if path.exists() { Some(path) } else { None }
}

/// Network-mode mounts map to a drive letter; `net use` releases it.
pub(super) async fn fallback_unmount(mount_point: &Path) -> Result<(), RunnerError> {
    let display = mount_point.display().to_string();
    let letter = display.trim_end_matches(['\\', ':']);
    if letter.len() != 1 {
        return Err(RunnerError::NonZeroExit {
            stderr: format!("{display} is not a drive letter"),
        });
    }

    debug!(drive = %letter, "platform unmount");

    let output = Command::new("net")
        .args(["use", &format!("{letter}:"), "/delete", "/y"])
        .output()
        .await
        .map_err(RunnerError::Launch)?;
    if output.status.success() {
        Ok(())
    } else {
        Err(RunnerError::NonZeroExit {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
