use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

use rcman::adapters;
use rcman::config::{MountParams, Settings, TransferParams};
use rcman::context::AppContext;
use rcman::core::{Flags, FlagValue, StreamEvent, TransferMethod, TransferProgress, cache};
use rcman::logging::{self, LogConfig, LogThrottle};

#[derive(Parser)]
#[command(name = "rcman")]
#[command(about = "Supervisor CLI for rclone mounts, transfers and tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use this rclone binary instead of the configured one
    #[arg(long, global = true)]
    executable: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the rclone version
    Version,
    /// List configured remotes
    Remotes,
    /// Show a remote's configuration
    RemoteInfo { name: String },
    /// Delete a remote from the rclone config
    RemoteDelete { name: String },
    /// Mount a remote and keep it up until Ctrl-C
    Mount(MountArgs),
    /// Unmount a mount point
    Unmount {
        mount_point: PathBuf,
        /// Identifier of the tracked mount process, if known
        #[arg(long)]
        id: Option<String>,
    },
    /// Copy, move or sync between two paths
    Transfer(TransferArgs),
    /// Verify file integrity of a path
    Check { path: String },
    /// Show the size of the VFS cache directory
    CacheSize,
    /// Clear the VFS cache
    CacheClean,
    /// Explore disk usage of a remote interactively
    Ncdu { remote: String },
    /// Show or update persisted settings
    Config(ConfigArgs),
}

#[derive(Args)]
struct MountArgs {
    /// Remote to mount, e.g. "gdrive:". Falls back to the last-used remote.
    remote: Option<String>,
    /// Local mount point. Falls back to the last-used mount point.
    mount_point: Option<PathBuf>,

    #[arg(long)]
    vfs_cache_mode: Option<String>,
    #[arg(long)]
    transfers: Option<u32>,
    /// Read-ahead buffer size, e.g. "32M"
    #[arg(long)]
    buffer_size: Option<String>,
    #[arg(long)]
    vfs_cache_max_size: Option<String>,
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    #[arg(long)]
    drive_chunk_size: Option<String>,
    #[arg(long)]
    checkers: Option<u32>,
    #[arg(long)]
    network_mode: bool,
    #[arg(long)]
    read_only: bool,
    #[arg(long)]
    no_modtime: bool,
    #[arg(long)]
    allow_other: bool,

    /// Persist these parameters as the new mount defaults
    #[arg(long)]
    save: bool,
}

#[derive(Args)]
struct TransferArgs {
    #[arg(value_enum)]
    method: TransferMethod,
    source: String,
    destination: String,

    /// Extra rclone flag, as `name` or `name=value`; repeatable
    #[arg(long = "flag", value_parser = parse_flag)]
    flags: Vec<(String, String)>,

    /// Persist these parameters as the new transfer defaults
    #[arg(long)]
    save: bool,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the active settings as TOML
    Show,
    /// Set and persist the rclone executable path
    SetExecutable { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogConfig {
        json: cli.json_logs,
        verbose: cli.verbose,
    });

    let mut settings = Settings::load();
    if let Some(exe) = &cli.executable {
        settings.executable = Some(exe.clone());
    } else if settings.executable.is_none() {
        if let Some(found) = adapters::find_executable() {
            info!(path = %found.display(), "discovered rclone executable");
            settings.executable = Some(found);
            if let Err(error) = settings.save() {
                warn!(%error, "could not persist discovered executable path");
            }
        }
    }

    let ctx = AppContext::new(settings);

    match cli.command {
        Commands::Version => {
            let version = ctx.runner.version().await.context("rclone version failed")?;
            println!("{version}");
        }
        Commands::Remotes => {
            let remotes = ctx
                .runner
                .list_remotes()
                .await
                .context("could not list remotes")?;
            if remotes.is_empty() {
                println!("No remotes configured. Run `rclone config` to add one.");
            }
            for remote in remotes {
                println!("{remote}");
            }
        }
        Commands::RemoteInfo { name } => {
            let details = ctx.runner.remote_details(&name).await?;
            print!("{details}");
        }
        Commands::RemoteDelete { name } => {
            ctx.runner.delete_remote(&name).await?;
            println!("Deleted remote {name}.");
        }
        Commands::Mount(args) => run_mount(&ctx, args).await?,
        Commands::Unmount { mount_point, id } => {
            ctx.runner.unmount(&mount_point, id.as_deref()).await?;
            println!("Unmounted {}.", mount_point.display());
        }
        Commands::Transfer(args) => run_transfer(&ctx, args).await?,
        Commands::Check { path } => {
            info!(path = %path, "starting integrity check");
            let result = ctx.runner.check(&path, &Flags::new()).await?;
            if !result.stdout.is_empty() {
                print!("{}", result.stdout);
            }
            if !result.success {
                bail!("check failed: {}", result.error);
            }
            println!("Integrity check passed.");
        }
        Commands::CacheSize => {
            let dir = &ctx.settings.cache_dir;
            let size = cache::directory_size(dir);
            println!("{} in {}", cache::format_size(size), dir.display());
        }
        Commands::CacheClean => run_cache_clean(&ctx).await?,
        Commands::Ncdu { remote } => {
            let id = ctx.runner.ncdu(&remote)?;
            // ncdu owns the terminal; poll the table until it exits.
            while ctx.runner.is_active(&id) {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
        Commands::Config(args) => run_config(&ctx, args)?,
    }

    Ok(())
}

async fn run_mount(ctx: &AppContext, args: MountArgs) -> Result<()> {
    let remote = args
        .remote
        .clone()
        .or_else(|| non_empty(&ctx.settings.last_mount.remote))
        .context("no remote given and none remembered; pass one, e.g. `rcman mount gdrive: /mnt/g`")?;
    let mount_point = args
        .mount_point
        .clone()
        .or_else(|| non_empty(&ctx.settings.last_mount.mount_point).map(PathBuf::from))
        .context("no mount point given and none remembered")?;

    #[cfg(unix)]
    std::fs::create_dir_all(&mount_point)
        .with_context(|| format!("could not create mount point {}", mount_point.display()))?;

    let flags = mount_flags(&args, &ctx.settings);

    if args.save {
        let mut settings = (*ctx.settings).clone();
        settings.last_mount = MountParams {
            remote: remote.clone(),
            mount_point: mount_point.display().to_string(),
            flags: flags.clone(),
        };
        settings.save().context("could not save mount defaults")?;
    }

    let id = ctx.runner.mount(&remote, &mount_point, &flags)?;
    println!("Mounted {remote} at {} (process {id}).", mount_point.display());
    println!("Keep this program running to keep the mount alive; Ctrl-C unmounts.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!(id = %id, "interrupt received, unmounting");
    ctx.runner.unmount(&mount_point, Some(&id)).await?;
    println!("Unmounted {}.", mount_point.display());
    Ok(())
}

/// Layer mount flags: settings defaults first, then everything given on the
/// command line on top.
fn mount_flags(args: &MountArgs, settings: &Settings) -> Flags {
    let mut flags = settings.last_mount.flags.clone();
    if !flags.contains("vfs-cache-mode") {
        flags.set("vfs-cache-mode", settings.cache_mode.clone());
    }
    if !flags.contains("cache-dir") {
        flags.set("cache-dir", settings.cache_dir.display().to_string());
    }

    if let Some(value) = &args.vfs_cache_mode {
        flags.set("vfs-cache-mode", value.clone());
    }
    if let Some(value) = args.transfers {
        flags.set("transfers", value);
    }
    if let Some(value) = &args.buffer_size {
        flags.set("buffer-size", value.clone());
    }
    if let Some(value) = &args.vfs_cache_max_size {
        flags.set("vfs-cache-max-size", value.clone());
    }
    if let Some(value) = &args.cache_dir {
        flags.set("cache-dir", value.display().to_string());
    }
    if let Some(value) = &args.drive_chunk_size {
        flags.set("drive-chunk-size", value.clone());
    }
    if let Some(value) = args.checkers {
        flags.set("checkers", value);
    }
    if args.network_mode {
        flags.set("network-mode", true);
    }
    if args.read_only {
        flags.set("read-only", true);
    }
    if args.no_modtime {
        flags.set("no-modtime", true);
    }
    if args.allow_other {
        flags.set("allow-other", true);
    }
    flags
}

async fn run_transfer(ctx: &AppContext, args: TransferArgs) -> Result<()> {
    let mut flags = ctx.settings.last_transfer.flags.clone();
    for (name, value) in &args.flags {
        flags.set(name.clone(), flag_value(value));
    }

    if args.save {
        let mut settings = (*ctx.settings).clone();
        settings.last_transfer = TransferParams {
            method: args.method,
            source: args.source.clone(),
            destination: args.destination.clone(),
            flags: flags.clone(),
        };
        settings.save().context("could not save transfer defaults")?;
    }

    let (id, mut rx) = ctx
        .runner
        .transfer(args.method, &args.source, &args.destination, &flags)?;
    info!(id = %id, method = args.method.as_str(), "transfer started");

    let mut progress = TransferProgress::default();
    let throttle = LogThrottle::new(Duration::from_millis(500));
    let mut exit_code = None;

    while let Some(event) = rx.recv().await {
        if let Some(marker) = event.as_marker_line() {
            // Terminal events keep their marker form in the raw output so
            // anything piping it sees the documented stream format.
            println!("{marker}");
        }
        match event {
            StreamEvent::Line(line) => {
                println!("{line}");
                if progress.apply_line(&line) && throttle.should_log() {
                    debug!(
                        transferred = %progress.transferred,
                        speed = %progress.speed,
                        eta = %progress.eta,
                        percent = ?progress.percent,
                        "transfer progress"
                    );
                }
            }
            StreamEvent::Done(code) => exit_code = Some(code),
            StreamEvent::Failed(message) => bail!("transfer failed: {message}"),
        }
    }

    match exit_code {
        Some(0) => {
            info!(id = %id, "transfer complete");
            Ok(())
        }
        Some(code) => bail!("rclone exited with status {code}"),
        None => bail!("transfer stream ended without a result"),
    }
}

async fn run_cache_clean(ctx: &AppContext) -> Result<()> {
    match ctx.runner.forget_vfs().await {
        Ok(response) => {
            debug!(%response, "rc vfs/forget succeeded");
            println!("Cache cleared through rclone.");
        }
        Err(error) => {
            info!(%error, "rc vfs/forget unavailable, sweeping cache directory");
            let dir = &ctx.settings.cache_dir;
            if !dir.exists() {
                bail!("cache directory {} does not exist", dir.display());
            }
            let report = cache::clean(dir);
            println!(
                "Removed {} files and {} directories from {}.",
                report.files_removed,
                report.dirs_removed,
                dir.display()
            );
        }
    }
    Ok(())
}

fn run_config(ctx: &AppContext, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            let rendered =
                toml::to_string_pretty(ctx.settings.as_ref()).context("settings not printable")?;
            print!("{rendered}");
        }
        ConfigCommands::SetExecutable { path } => {
            if !path.exists() {
                bail!("{} does not exist", path.display());
            }
            let mut settings = (*ctx.settings).clone();
            settings.executable = Some(path.clone());
            settings.save().context("could not save settings")?;
            println!("Executable set to {}.", path.display());
        }
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_flag(raw: &str) -> Result<(String, String), String> {
    let raw = raw.trim_start_matches("--");
    if raw.is_empty() {
        return Err("flag name is empty".to_string());
    }
    match raw.split_once('=') {
        Some((name, value)) => Ok((name.to_string(), value.to_string())),
        None => Ok((raw.to_string(), "true".to_string())),
    }
}

fn flag_value(value: &str) -> FlagValue {
    match value {
        "true" => FlagValue::Bool(true),
        "false" => FlagValue::Bool(false),
        other => match other.parse::<i64>() {
            Ok(number) => FlagValue::Int(number),
            Err(_) => FlagValue::Text(other.to_string()),
        },
    }
}
