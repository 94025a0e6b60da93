//! PharmaNotify console client
//!
//! Two modes:
//! - `pharma connect --nombre <farmacia>`: interactive pharmacy session.
//!   Registers over TCP, prints the status digest, then alternates
//!   between typed commands and notifications pushed by the daemon.
//! - `pharma admin <accion>`: one-shot administrative request over the
//!   daemon's Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Connect as a registered pharmacy
//! pharma connect --nombre "Farmacia Central"
//!
//! # Point at a remote daemon
//! pharma connect --nombre Central --addr 10.0.0.5:9999
//!
//! # Administer the daemon
//! pharma admin crear-farmacia "Farmacia Central"
//! pharma admin listar-farmacias
//! pharma admin status
//! pharma admin scan
//! ```
//!
//! Tracing goes to a file under the state directory so log lines never
//! interleave with the interactive console.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pharma::session::{self, ConnectConfig};
use pharma::{admin, render, ClientError};
use pharma_protocol::{AdminRequest, Tarea};

/// Daemon address used when neither `--addr` nor `PHARMAD_CONNECT` is set.
const DEFAULT_ADDR: &str = "localhost:9999";

/// Admin socket used when neither `--socket` nor `PHARMAD_ADMIN_SOCKET`
/// is set. Must match the daemon's default.
const DEFAULT_ADMIN_SOCKET: &str = "/tmp/pharma_monitor.sock";

/// PharmaNotify console client
#[derive(Parser, Debug)]
#[command(name = "pharma", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect as a pharmacy and start an interactive session
    Connect {
        /// Registered farmacia name
        #[arg(short, long)]
        nombre: String,

        /// Daemon address (host:port); defaults to $PHARMAD_CONNECT
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Send a one-shot administrative command to the daemon
    Admin {
        /// Admin socket path; defaults to $PHARMAD_ADMIN_SOCKET
        #[arg(long)]
        socket: Option<PathBuf>,

        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Register a new farmacia
    CrearFarmacia { nombre: String },
    /// List every farmacia, active or not
    ListarFarmacias,
    /// Rename a farmacia; a live session under the old name is closed
    RenombrarFarmacia {
        nombre_actual: String,
        nombre_nuevo: String,
    },
    /// Deactivate a farmacia; its live session is closed
    DesactivarFarmacia { nombre: String },
    /// Reactivate a previously deactivated farmacia
    ActivarFarmacia { nombre: String },
    /// Show system-wide counters
    Estadisticas,
    /// List currently connected pharmacies
    Status,
    /// Force-run the expiration scan now
    Scan,
    /// Force-run the read-notification purge now
    Purge,
}

impl From<AdminAction> for AdminRequest {
    fn from(action: AdminAction) -> Self {
        match action {
            AdminAction::CrearFarmacia { nombre } => AdminRequest::CrearFarmacia { nombre },
            AdminAction::ListarFarmacias => AdminRequest::ListarFarmacias,
            AdminAction::RenombrarFarmacia {
                nombre_actual,
                nombre_nuevo,
            } => AdminRequest::RenombrarFarmacia {
                nombre_actual,
                nombre_nuevo,
            },
            AdminAction::DesactivarFarmacia { nombre } => {
                AdminRequest::DesactivarFarmacia { nombre }
            }
            AdminAction::ActivarFarmacia { nombre } => AdminRequest::ActivarFarmacia { nombre },
            AdminAction::Estadisticas => AdminRequest::Estadisticas,
            AdminAction::Status => AdminRequest::Status,
            AdminAction::Scan => AdminRequest::RunTarea {
                tarea: Tarea::VerificarVencimientos,
            },
            AdminAction::Purge => AdminRequest::RunTarea {
                tarea: Tarea::LimpiarNotificaciones,
            },
        }
    }
}

/// State directory shared with the daemon; the client only writes its
/// log file there.
fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("pharmad")
}

/// Opens the client log file, creating the directory if needed.
///
/// Returns `None` when the file cannot be opened; the console then runs
/// without logging rather than polluting the terminal.
fn open_log_file() -> Option<std::fs::File> {
    let log_dir = state_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Aviso: no se pudo crear el directorio de logs {log_dir:?}: {e}");
        return None;
    }

    let log_path = log_dir.join("pharma.log");
    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Aviso: no se pudo abrir el archivo de log {log_path:?}: {e}");
            None
        }
    }
}

/// Routes tracing to the log file so it never corrupts console output.
fn init_logging() {
    let directive = "pharma=info"
        .parse()
        .unwrap_or_else(|_| tracing_subscriber::filter::Directive::from(tracing::Level::INFO));

    match open_log_file() {
        Some(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("off"))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    match args.command {
        Command::Connect { nombre, addr } => {
            let addr = addr
                .or_else(|| std::env::var("PHARMAD_CONNECT").ok())
                .unwrap_or_else(|| DEFAULT_ADDR.to_string());
            run_session(ConnectConfig { addr, nombre }).await
        }
        Command::Admin { socket, action } => {
            let socket = socket
                .or_else(|| std::env::var("PHARMAD_ADMIN_SOCKET").ok().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ADMIN_SOCKET));
            run_admin(&socket, action.into()).await
        }
    }
}

async fn run_session(config: ConnectConfig) -> Result<()> {
    // Ctrl-C turns into a polite disconnect instead of a dropped socket.
    let shutdown = CancellationToken::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            interrupt.cancel();
        }
    });

    match session::run(&config, shutdown).await {
        Ok(()) => Ok(()),
        // The reason was already printed; exit quietly but nonzero.
        Err(ClientError::Rejected(motivo)) => {
            warn!(motivo = %motivo, "registration rejected");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

async fn run_admin(socket: &std::path::Path, request: AdminRequest) -> Result<()> {
    match admin::request(socket, &request).await {
        Ok(response) => {
            let es_error = matches!(response, pharma_protocol::AdminResponse::Error { .. });
            println!("{}", render::admin_response(&response));
            if es_error {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(ClientError::Connect { addr, source }) => {
            eprintln!("No se pudo conectar con el daemon en {addr}: {source}");
            eprintln!("¿Está pharmad en ejecución?");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
