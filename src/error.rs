use thiserror::Error;

/// Failures reported by the process supervisor.
///
/// Every public runner operation resolves to a value or one of these
/// variants; worker tasks never let a failure escape as a panic.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("rclone executable path is not configured")]
    ExecutableNotConfigured,

    #[error("failed to launch process: {0}")]
    Launch(#[from] std::io::Error),

    #[error("command timed out after {seconds}s")]
    TimeoutExceeded { seconds: u64 },

    #[error("process reported failure: {stderr}")]
    NonZeroExit { stderr: String },

    #[error("no tracked process with id {0}")]
    NotFound(String),
}
