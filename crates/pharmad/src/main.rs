//! PharmaNotify daemon - expiry surveillance and notification delivery
//!
//! This binary accepts pharmacy client connections over TCP, serves the
//! administrative console over a Unix socket, and runs the background
//! jobs that watch the inventory for expiring medication.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! pharmad start
//!
//! # Start the daemon (background/daemonized)
//! pharmad start -d
//!
//! # Stop the daemon
//! pharmad stop
//!
//! # Check daemon status
//! pharmad status
//!
//! # Start with a custom config file
//! pharmad start --config /etc/pharmad.toml
//!
//! # Override single settings through the environment
//! PHARMAD_LISTEN=127.0.0.1:9999 pharmad start
//!
//! # Enable debug logging
//! RUST_LOG=pharmad=debug pharmad start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: graceful shutdown

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pharma_store::{SqliteStore, Store};
use pharmad::bus::NotificationBus;
use pharmad::config::{default_state_dir, DaemonConfig};
use pharmad::registry::spawn_registry;
use pharmad::scheduler::spawn_scheduler;
use pharmad::server::Coordinator;

/// PharmaNotify daemon - medication expiry notifications
#[derive(Parser, Debug)]
#[command(name = "pharmad", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn pid_path() -> PathBuf {
    default_state_dir().join("pharmad.pid")
}

fn log_path() -> PathBuf {
    default_state_dir().join("pharmad.log")
}

/// PID recorded by a previous `start`, if the file parses.
fn recorded_pid() -> Option<u32> {
    fs::read_to_string(pid_path()).ok()?.trim().parse().ok()
}

fn record_pid() -> Result<()> {
    let path = pid_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    fs::write(&path, process::id().to_string()).context("Failed to write PID file")
}

fn discard_pid() {
    let _ = fs::remove_file(pid_path());
}

fn process_alive(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// PID of a live daemon. A PID file pointing at a dead process is
/// treated as stale and discarded on the spot.
fn running_daemon() -> Option<u32> {
    let pid = recorded_pid()?;
    if process_alive(pid) {
        Some(pid)
    } else {
        discard_pid();
        None
    }
}

fn signal_stop(pid: u32) -> Result<()> {
    if unsafe { libc::kill(pid as i32, libc::SIGTERM) } != 0 {
        bail!("Could not deliver SIGTERM to process {pid}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Bare `pharmad` behaves like `pharmad start`
    let command = args.command.unwrap_or(Command::Start { daemon: false });

    match command {
        Command::Start { daemon } => {
            if let Some(pid) = running_daemon() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'pharmad stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                // Fork before the tokio runtime exists.
                daemonize()?;
            }

            record_pid()?;
            let result = run_daemon(args.config);
            discard_pid();
            result
        }
        Command::Stop => {
            let Some(pid) = running_daemon() else {
                println!("Daemon is not running.");
                return Ok(());
            };
            println!("Stopping daemon (PID {pid})...");
            signal_stop(pid)?;

            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if !process_alive(pid) {
                    println!("Daemon stopped.");
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            eprintln!("Daemon did not stop within 5 seconds.");
            process::exit(1);
        }
        Command::Status => {
            let Some(pid) = running_daemon() else {
                println!("Daemon is not running.");
                process::exit(1);
            };
            println!("Daemon is running (PID {pid})");
            match DaemonConfig::load(args.config.as_deref()) {
                Ok(config) => {
                    println!("Listen: {}", config.server.listen);
                    if config.server.admin_socket.exists() {
                        println!("Admin socket: {}", config.server.admin_socket.display());
                    }
                }
                Err(e) => eprintln!("Could not read configuration: {e:#}"),
            }
            Ok(())
        }
    }
}

/// Forks to the background, routing stdout/stderr to the log file.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log = log_path();
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }
    let stdout = fs::File::create(&log).context("Failed to create log file for stdout")?;
    let stderr = fs::File::create(&log).context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;
    Ok(())
}

/// Async entry point.
#[tokio::main]
async fn run_daemon(config_path: Option<PathBuf>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pharmad=info".parse()?)
                .add_directive("pharma_store=info".parse()?)
                .add_directive("pharma_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "pharmad starting"
    );

    let config = DaemonConfig::load(config_path.as_deref())?;

    // Graceful shutdown: every component hangs off this token.
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(name) => info!(signal = name, "shutdown signal received"),
            Err(e) => error!(error = %e, "failed to install signal handlers"),
        }
        shutdown_token.cancel();
    });

    if let Some(parent) = config.store.db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.store.db_path)
            .with_context(|| {
                format!("Failed to open store at {}", config.store.db_path.display())
            })?
            .with_default_umbral(config.store.default_umbral_dias),
    );
    info!(db = %config.store.db_path.display(), "store opened");

    let registry = spawn_registry();
    let bus = NotificationBus::new();
    let scheduler = spawn_scheduler(
        Arc::clone(&store),
        bus.clone(),
        &config.scheduler,
        cancel_token.clone(),
    );

    let coordinator = Coordinator::bind(
        &config.server,
        store,
        registry,
        bus,
        scheduler,
        cancel_token,
    )
    .await?;
    coordinator.run().await;

    info!("pharmad stopped");
    Ok(())
}

/// Resolves with the name of the first termination signal delivered.
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}
