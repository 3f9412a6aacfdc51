pub mod cache;
pub mod flags;
pub mod models;
pub mod progress;
pub mod runner;

pub use cache::CleanReport;
pub use flags::{FlagValue, Flags};
pub use models::{CommandResult, ManagedProcess, ProcessKind, StreamEvent, TransferMethod};
pub use progress::TransferProgress;
pub use runner::RcloneRunner;
