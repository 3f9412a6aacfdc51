//! Persisted user settings.
//!
//! Settings live in a TOML file under the user's config directory and are
//! layered with `RCMAN_`-prefixed environment variables via figment. A load
//! failure is never fatal: it logs a warning and yields the built-in
//! defaults. Saving happens only on explicit user action.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::flags::Flags;
use crate::core::models::TransferMethod;

const ENV_PREFIX: &str = "RCMAN_";

/// Last-used mount form state, replayed as defaults for the next mount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountParams {
    pub remote: String,
    pub mount_point: String,
    pub flags: Flags,
}

/// Last-used transfer form state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferParams {
    pub method: TransferMethod,
    pub source: String,
    pub destination: String,
    pub flags: Flags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the rclone binary. `None` until discovered or set by the
    /// user; revalidated on every load.
    pub executable: Option<PathBuf>,
    pub cache_mode: String,
    pub cache_dir: PathBuf,
    pub theme: String,
    pub last_mount: MountParams,
    pub last_transfer: TransferParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            executable: None,
            cache_mode: "writes".to_string(),
            cache_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".rclone-cache"),
            theme: "flatly".to_string(),
            last_mount: MountParams::default(),
            last_transfer: TransferParams::default(),
        }
    }
}

/// Default location of the settings file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rcman")
        .join("config.toml")
}

impl Settings {
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    /// Load settings from `path`, layered under environment overrides.
    ///
    /// Any failure falls back to defaults; a stored executable path that no
    /// longer exists on disk is cleared so discovery runs again.
    pub fn load_from(path: &Path) -> Self {
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        let mut settings: Settings = match figment.extract() {
            Ok(settings) => settings,
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to load settings, using defaults");
                Settings::default()
            }
        };

        if let Some(exe) = &settings.executable {
            if !exe.exists() {
                warn!(
                    path = %exe.display(),
                    "configured rclone executable no longer exists, clearing it"
                );
                settings.executable = None;
            }
        }

        settings
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&default_config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&temp.path().join("absent.toml"));

        assert_eq!(settings.cache_mode, "writes");
        assert_eq!(settings.theme, "flatly");
        assert!(settings.executable.is_none());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "cache_mode = [this is not toml").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn stale_executable_path_is_cleared() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "executable = \"/nonexistent/rclone\"\n").unwrap();

        let settings = Settings::load_from(&path);
        assert!(settings.executable.is_none());
    }

    #[test]
    fn existing_executable_path_survives_load() {
        let temp = tempfile::tempdir().unwrap();
        let exe = temp.path().join("rclone");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();

        let path = temp.path().join("config.toml");
        std::fs::write(&path, format!("executable = {:?}\n", exe.display().to_string())).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.executable.as_deref(), Some(exe.as_path()));
    }

    #[test]
    fn settings_round_trip_through_file() {
        let temp = tempfile::tempdir().unwrap();
        let exe = temp.path().join("rclone");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();

        let mut settings = Settings::default();
        settings.executable = Some(exe);
        settings.last_mount.remote = "gdrive:".to_string();
        settings.last_mount.flags.set("read-only", true);
        settings.last_transfer.method = TransferMethod::Sync;

        let path = temp.path().join("config.toml");
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path);
        assert_eq!(loaded, settings);
    }
}
