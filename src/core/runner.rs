//! Process supervision for rclone invocations.
//!
//! [`RcloneRunner`] owns the table of live child processes and exposes the
//! three launch primitives everything else is built on:
//!
//! - bounded runs that wait for exit and capture output
//! - tracked launches (mounts, ncdu) that run until terminated
//! - streaming launches (transfers) whose output is forwarded line by line
//!   over a channel, closed by exactly one terminal event
//!
//! The table is the only shared mutable state. Insertions happen at launch,
//! removals on exit or termination, and removing an identifier that is
//! already gone is a no-op.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters;
use crate::core::flags::Flags;
use crate::core::models::{
    CommandResult, ManagedProcess, ProcessKind, StreamEvent, TransferMethod,
};
use crate::error::RunnerError;

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const CONFIG_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Supervisor for rclone child processes. Cheap to clone; clones share the
/// executable path and the process table.
#[derive(Clone, Default)]
pub struct RcloneRunner {
    executable: Arc<Mutex<Option<PathBuf>>>,
    // Guarded by a std mutex: every critical section is a single map
    // operation and the lock is never held across an await.
    processes: Arc<Mutex<HashMap<String, ManagedProcess>>>,
}

impl RcloneRunner {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            executable: Arc::new(Mutex::new(executable)),
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn set_executable(&self, path: Option<PathBuf>) {
        *self.executable.lock().unwrap() = path;
    }

    pub fn executable(&self) -> Option<PathBuf> {
        self.executable.lock().unwrap().clone()
    }

    fn executable_or_err(&self) -> Result<PathBuf, RunnerError> {
        self.executable()
            .ok_or(RunnerError::ExecutableNotConfigured)
    }

    /// Identifiers of all currently tracked processes.
    pub fn active_ids(&self) -> Vec<String> {
        self.processes.lock().unwrap().keys().cloned().collect()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.processes.lock().unwrap().contains_key(id)
    }

    /// Register a launch under a fresh `<kind>_<YYYYMMDDHHMMSS>` identifier.
    ///
    /// Same-second launches bump the stamp forward until the identifier is
    /// free, so there is never more than one entry per identifier.
    fn register(&self, kind: ProcessKind, command: Vec<String>, cancel: CancellationToken) -> String {
        let started_at = Local::now();
        let mut table = self.processes.lock().unwrap();

        let mut stamp = started_at;
        let mut id = format!("{}_{}", kind.as_str(), stamp.format("%Y%m%d%H%M%S"));
        while table.contains_key(&id) {
            stamp = stamp + chrono::Duration::seconds(1);
            id = format!("{}_{}", kind.as_str(), stamp.format("%Y%m%d%H%M%S"));
        }

        table.insert(
            id.clone(),
            ManagedProcess {
                kind,
                command,
                started_at,
                cancel,
            },
        );
        id
    }

    fn deregister(&self, id: &str) -> Option<ManagedProcess> {
        let removed = self.processes.lock().unwrap().remove(id);
        if let Some(process) = &removed {
            let uptime = Local::now().signed_duration_since(process.started_at);
            debug!(id = %id, kind = %process.kind, uptime_secs = uptime.num_seconds(), "process deregistered");
        }
        removed
    }

    /// The full command line a tracked process was launched with.
    pub fn command_of(&self, id: &str) -> Option<Vec<String>> {
        self.processes
            .lock()
            .unwrap()
            .get(id)
            .map(|process| process.command.clone())
    }

    /// Run a short-lived invocation to completion, capturing its output.
    ///
    /// With a timeout, the child is killed once the deadline passes and the
    /// call fails with [`RunnerError::TimeoutExceeded`]. Bounded runs are
    /// never registered in the process table.
    pub async fn run_bounded(
        &self,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandResult, RunnerError> {
        let exe = self.executable_or_err()?;

        debug!(command = %render_command(&exe, args), "running bounded command");

        let mut command = Command::new(&exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must reap the child.
            .kill_on_drop(true);

        let child = command.spawn().map_err(RunnerError::Launch)?;
        let wait = child.wait_with_output();

        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(output) => output.map_err(RunnerError::Launch)?,
                Err(_) => {
                    return Err(RunnerError::TimeoutExceeded {
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => wait.await.map_err(RunnerError::Launch)?,
        };

        Ok(CommandResult::from_output(output))
    }

    /// Start a long-running process without waiting for completion.
    ///
    /// The identifier is registered before this returns and a watcher task
    /// deregisters it when the child exits. Returning only means the OS
    /// accepted the spawn; callers that need "actually ready" semantics
    /// (e.g. a mount that is browsable) must poll for it themselves.
    pub fn launch_tracked(
        &self,
        kind: ProcessKind,
        args: &[String],
    ) -> Result<String, RunnerError> {
        let exe = self.executable_or_err()?;

        // Stdio stays inherited: mounts log to the terminal and ncdu is
        // interactive.
        let mut child = Command::new(&exe)
            .args(args)
            .spawn()
            .map_err(RunnerError::Launch)?;

        let cancel = CancellationToken::new();
        let id = self.register(kind, render_argv(&exe, args), cancel.clone());
        info!(id = %id, command = %render_command(&exe, args), "tracked process started");

        let runner = self.clone();
        let watch_id = id.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => {
                        debug!(id = %watch_id, code = ?status.code(), "tracked process exited")
                    }
                    Err(error) => warn!(id = %watch_id, %error, "wait on tracked process failed"),
                },
                _ = cancel.cancelled() => {
                    if let Err(error) = child.start_kill() {
                        warn!(id = %watch_id, %error, "kill request failed");
                    }
                    let _ = child.wait().await;
                }
            }
            runner.deregister(&watch_id);
        });

        Ok(id)
    }

    /// Start a process and stream its combined output.
    ///
    /// Every line of stdout and stderr arrives as [`StreamEvent::Line`] in
    /// the order the child produced it (per stream); lines that are empty
    /// after trimming are dropped. The channel always ends with exactly one
    /// terminal event: `Done(code)` once the child exits, or `Failed` if
    /// waiting on it failed. Termination mid-stream kills the child, whose
    /// final buffered lines may still arrive before the terminal event.
    pub fn launch_streaming(
        &self,
        kind: ProcessKind,
        args: &[String],
    ) -> Result<(String, mpsc::Receiver<StreamEvent>), RunnerError> {
        let exe = self.executable_or_err()?;

        let mut child = Command::new(&exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RunnerError::Launch)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Launch(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Launch(std::io::Error::other("stderr not captured")))?;

        let cancel = CancellationToken::new();
        let id = self.register(kind, render_argv(&exe, args), cancel.clone());
        info!(id = %id, command = %render_command(&exe, args), "streaming process started");

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let out_pump = tokio::spawn(pump_lines(stdout, tx.clone()));
        let err_pump = tokio::spawn(pump_lines(stderr, tx.clone()));

        let runner = self.clone();
        let watch_id = id.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = cancel.cancelled() => {
                    if let Err(error) = child.start_kill() {
                        warn!(id = %watch_id, %error, "kill request failed");
                    }
                    child.wait().await
                }
            };

            // Both pumps must drain before the terminal event so that it is
            // always the last delivery.
            let _ = out_pump.await;
            let _ = err_pump.await;

            let event = match status {
                Ok(status) => StreamEvent::Done(status.code().unwrap_or(-1)),
                Err(error) => StreamEvent::Failed(error.to_string()),
            };
            let _ = tx.send(event).await;

            runner.deregister(&watch_id);
        });

        Ok((id, rx))
    }

    /// Request termination of a tracked process and forget it immediately.
    ///
    /// Does not wait for the child to actually exit. Terminating an unknown
    /// identifier is reported as [`RunnerError::NotFound`], never a panic.
    pub fn terminate(&self, id: &str) -> Result<(), RunnerError> {
        match self.deregister(id) {
            Some(process) => {
                info!(id = %id, kind = %process.kind, "terminating process");
                process.cancel.cancel();
                Ok(())
            }
            None => Err(RunnerError::NotFound(id.to_string())),
        }
    }

    /// Unmount a mount point: terminate its tracked process when the
    /// identifier is known, otherwise fall back to the platform unmount
    /// command.
    pub async fn unmount(
        &self,
        mount_point: &Path,
        id: Option<&str>,
    ) -> Result<(), RunnerError> {
        if let Some(id) = id {
            if self.terminate(id).is_ok() {
                return Ok(());
            }
            debug!(id = %id, "identifier not tracked, trying platform unmount");
        }
        adapters::fallback_unmount(mount_point).await
    }

    /// `rclone version`, reduced to its first line.
    pub async fn version(&self) -> Result<String, RunnerError> {
        let result = self
            .run_bounded(&["version".to_string()], Some(VERSION_TIMEOUT))
            .await?;
        if !result.success {
            return Err(RunnerError::NonZeroExit {
                stderr: result.error,
            });
        }
        Ok(result.stdout.lines().next().unwrap_or_default().to_string())
    }

    /// Configured remote names, with the trailing `:` stripped.
    pub async fn list_remotes(&self) -> Result<Vec<String>, RunnerError> {
        let result = self
            .run_bounded(&["listremotes".to_string()], Some(CONFIG_TIMEOUT))
            .await?;
        if !result.success {
            return Err(RunnerError::NonZeroExit {
                stderr: result.error,
            });
        }
        Ok(result
            .stdout
            .lines()
            .map(|line| line.trim().trim_end_matches(':').to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// `rclone config show <name>`.
    pub async fn remote_details(&self, name: &str) -> Result<String, RunnerError> {
        let args = vec!["config".to_string(), "show".to_string(), name.to_string()];
        let result = self.run_bounded(&args, Some(CONFIG_TIMEOUT)).await?;
        if !result.success {
            return Err(RunnerError::NonZeroExit {
                stderr: result.error,
            });
        }
        Ok(result.stdout)
    }

    /// `rclone config delete <name>`.
    pub async fn delete_remote(&self, name: &str) -> Result<(), RunnerError> {
        let args = vec!["config".to_string(), "delete".to_string(), name.to_string()];
        let result = self.run_bounded(&args, Some(CONFIG_TIMEOUT)).await?;
        if !result.success {
            return Err(RunnerError::NonZeroExit {
                stderr: result.error,
            });
        }
        Ok(())
    }

    /// Ask a running rclone rc server to drop its VFS cache. Returns the
    /// server's JSON response, or `Null` when the response is not JSON.
    pub async fn forget_vfs(&self) -> Result<serde_json::Value, RunnerError> {
        let args = vec!["rc".to_string(), "vfs/forget".to_string()];
        let result = self.run_bounded(&args, Some(CONFIG_TIMEOUT)).await?;
        if !result.success {
            return Err(RunnerError::NonZeroExit {
                stderr: result.error,
            });
        }
        Ok(serde_json::from_str(&result.stdout).unwrap_or(serde_json::Value::Null))
    }

    /// Mount a remote at a local path as a tracked background process.
    pub fn mount(
        &self,
        remote: &str,
        mount_point: &Path,
        flags: &Flags,
    ) -> Result<String, RunnerError> {
        let mut args = vec![
            "mount".to_string(),
            remote.to_string(),
            mount_point.display().to_string(),
        ];
        args.extend(flags.render());
        self.launch_tracked(ProcessKind::Mount, &args)
    }

    /// Start a streaming transfer. `--progress` is appended when the caller
    /// did not already ask for it, so progress lines always flow.
    pub fn transfer(
        &self,
        method: TransferMethod,
        source: &str,
        destination: &str,
        flags: &Flags,
    ) -> Result<(String, mpsc::Receiver<StreamEvent>), RunnerError> {
        let mut args = vec![
            method.as_str().to_string(),
            source.to_string(),
            destination.to_string(),
        ];
        args.extend(flags.render());
        if !args.iter().any(|arg| arg == "--progress" || arg == "-P") {
            args.push("--progress".to_string());
        }
        self.launch_streaming(ProcessKind::Transfer, &args)
    }

    /// Integrity check of a path against itself, as a bounded run with no
    /// timeout. Large remotes take as long as they take.
    pub async fn check(&self, path: &str, flags: &Flags) -> Result<CommandResult, RunnerError> {
        let mut args = vec!["check".to_string(), path.to_string(), path.to_string()];
        args.extend(flags.render());
        self.run_bounded(&args, None).await
    }

    /// Interactive disk-usage explorer over a remote, tracked like a mount.
    pub fn ncdu(&self, remote: &str) -> Result<String, RunnerError> {
        let args = vec!["ncdu".to_string(), remote.to_string()];
        self.launch_tracked(ProcessKind::Ncdu, &args)
    }
}

/// Forward every non-empty line of `stream` as a `Line` event.
///
/// rclone rewrites its progress display with carriage returns, so both `\r`
/// and `\n` end a line here. If the receiver goes away the remaining output
/// is still read to EOF so the child never blocks on a full pipe.
async fn pump_lines<R>(stream: R, tx: mpsc::Sender<StreamEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    let mut sink_open = true;

    loop {
        match reader.read(&mut byte).await {
            Ok(0) => break,
            Ok(_) => {
                if byte[0] == b'\r' || byte[0] == b'\n' {
                    if let Some(text) = take_line(&mut line) {
                        if sink_open && tx.send(StreamEvent::Line(text)).await.is_err() {
                            sink_open = false;
                        }
                    }
                } else {
                    line.push(byte[0]);
                }
            }
            Err(error) => {
                warn!(%error, "output stream read failed");
                break;
            }
        }
    }

    if let Some(text) = take_line(&mut line) {
        if sink_open {
            let _ = tx.send(StreamEvent::Line(text)).await;
        }
    }
}

fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    if buffer.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(buffer).trim().to_string();
    buffer.clear();
    if text.is_empty() { None } else { Some(text) }
}

fn render_argv(exe: &Path, args: &[String]) -> Vec<String> {
    let mut argv = vec![exe.display().to_string()];
    argv.extend(args.iter().cloned());
    argv
}

fn render_command(exe: &Path, args: &[String]) -> String {
    render_argv(exe, args).join(" ")
}
