use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// What a tracked process was launched for. Becomes the identifier prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKind {
    Mount,
    Transfer,
    Ncdu,
}

impl ProcessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Transfer => "transfer",
            Self::Ncdu => "ncdu",
        }
    }
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy/move/sync selector for transfer operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    #[default]
    Copy,
    Move,
    Sync,
}

impl TransferMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Sync => "sync",
        }
    }
}

/// Supervisor-side record of a live child process.
///
/// Owned exclusively by the supervisor's table from launch until the entry
/// is removed, exactly once, on natural exit or termination. The child
/// handle itself lives in the watcher task; cancelling the token is the
/// only way to reach it from outside.
pub struct ManagedProcess {
    pub kind: ProcessKind,
    pub command: Vec<String>,
    pub started_at: DateTime<Local>,
    pub(crate) cancel: CancellationToken,
}

/// Outcome of a bounded invocation. Immutable once built; `error` holds the
/// captured stderr on failure and is empty on success.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub success: bool,
    pub error: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub(crate) fn from_output(output: std::process::Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let success = output.status.success();
        let error = if success { String::new() } else { stderr.clone() };
        Self {
            success,
            error,
            stdout,
            stderr,
        }
    }
}

const RETURN_CODE_PREFIX: &str = "__RETURN_CODE:";
const ERROR_PREFIX: &str = "__ERROR:";
const MARKER_SUFFIX: &str = "__";

/// One delivery from a streaming invocation.
///
/// A stream is a sequence of `Line` events followed by exactly one terminal
/// event: `Done` with the exit code when the child ran, `Failed` with a
/// message when it could not be waited on.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Line(String),
    Done(i32),
    Failed(String),
}

impl StreamEvent {
    /// Recognize the legacy text encoding of a terminal event.
    ///
    /// Runs before any progress parsing: marker lines are control flow, not
    /// output data.
    pub fn from_marker_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(RETURN_CODE_PREFIX) {
            let code = rest.strip_suffix(MARKER_SUFFIX).unwrap_or(rest).trim();
            return code.parse().ok().map(Self::Done);
        }
        if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
            let message = rest.strip_suffix(MARKER_SUFFIX).unwrap_or(rest).trim();
            return Some(Self::Failed(message.to_string()));
        }
        None
    }

    /// Text encoding of a terminal event for raw-output sinks. `Line` has no
    /// marker form.
    pub fn as_marker_line(&self) -> Option<String> {
        match self {
            Self::Done(code) => Some(format!("{RETURN_CODE_PREFIX}{code}{MARKER_SUFFIX}")),
            Self::Failed(message) => Some(format!("{ERROR_PREFIX}{message}{MARKER_SUFFIX}")),
            Self::Line(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Line(_))
    }
}
