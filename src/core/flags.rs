//! Command-line flag rendering for rclone invocations.
//!
//! Every operation (mount, transfer, check) assembles its extra options
//! through [`Flags`], so the rendering rule is uniform: a boolean `true`
//! becomes a bare `--flag`, `false` is omitted entirely, and any other
//! value becomes `--flag value`. The maps are serializable because the
//! last-used mount and transfer options persist in the settings file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for FlagValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// An ordered map of flag name to value. BTreeMap keeps rendering
/// deterministic across runs, which keeps the spawned command lines stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(BTreeMap<String, FlagValue>);

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FlagValue>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render to argv form.
    pub fn render(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (name, value) in &self.0 {
            match value {
                FlagValue::Bool(true) => args.push(format!("--{name}")),
                FlagValue::Bool(false) => {}
                FlagValue::Int(n) => {
                    args.push(format!("--{name}"));
                    args.push(n.to_string());
                }
                FlagValue::Text(s) => {
                    args.push(format!("--{name}"));
                    args.push(s.clone());
                }
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_renders_bare_flag() {
        let mut flags = Flags::new();
        flags.set("read-only", true);
        assert_eq!(flags.render(), vec!["--read-only"]);
    }

    #[test]
    fn value_renders_flag_and_argument() {
        let mut flags = Flags::new();
        flags.set("drive-chunk-size", "32M");
        assert_eq!(flags.render(), vec!["--drive-chunk-size", "32M"]);
    }

    #[test]
    fn false_renders_nothing() {
        let mut flags = Flags::new();
        flags.set("allow-other", false);
        assert!(flags.render().is_empty());
    }

    #[test]
    fn numeric_values_render_as_text() {
        let mut flags = Flags::new();
        flags.set("transfers", 4u32);
        assert_eq!(flags.render(), vec!["--transfers", "4"]);
    }

    #[test]
    fn rendering_order_is_deterministic() {
        let mut flags = Flags::new();
        flags
            .set("vfs-cache-mode", "writes")
            .set("allow-other", true)
            .set("buffer-size", "32M");
        assert_eq!(
            flags.render(),
            vec![
                "--allow-other",
                "--buffer-size",
                "32M",
                "--vfs-cache-mode",
                "writes",
            ]
        );
    }
}
