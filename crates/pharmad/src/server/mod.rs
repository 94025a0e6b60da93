//! Accept loops for both daemon channels.
//!
//! ```text
//!  pharmacy clients            admin console
//!       | TCP                       | Unix socket
//!       v                           v
//!  +-----------------------------------------+
//!  |               Coordinator               |
//!  |  accept -> ConnectionHandler (spawned)  |
//!  |  accept -> admin::handle_connection     |
//!  |  bus forwarder -> registry.deliver      |
//!  +-----------------------------------------+
//! ```
//!
//! The forwarder is the delivery half of the notification path: whatever
//! lands on the bus is offered to the live session of its farmacia, and
//! silently stays history-only when that farmacia is offline.

mod admin;
mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pharma_store::Store;

use crate::bus::NotificationBus;
use crate::config::ServerConfig;
use crate::registry::RegistryHandle;
use crate::scheduler::SchedulerHandle;

/// Largest frame either channel accepts (1 MB).
pub(crate) const MAX_FRAME_BYTES: u32 = 1_048_576;

/// Errors that prevent the coordinator from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind client listener on {addr}: {source}")]
    BindTcp {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare admin socket at {path}: {source}")]
    SocketSetup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind admin socket at {path}: {source}")]
    BindUnix {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owns both listeners and the notification forwarder.
pub struct Coordinator {
    listener: TcpListener,
    admin_listener: UnixListener,
    admin_socket: PathBuf,
    store: Arc<dyn Store>,
    registry: RegistryHandle,
    bus: NotificationBus,
    scheduler: SchedulerHandle,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Binds both listeners without accepting yet.
    ///
    /// A stale socket file left by a crashed run is removed first; a
    /// *live* daemon on the same path is indistinguishable from a stale
    /// file here, which is why startup guards with a pid file instead.
    pub async fn bind(
        config: &ServerConfig,
        store: Arc<dyn Store>,
        registry: RegistryHandle,
        bus: NotificationBus,
        scheduler: SchedulerHandle,
        cancel: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener =
            TcpListener::bind(&config.listen)
                .await
                .map_err(|source| ServerError::BindTcp {
                    addr: config.listen.clone(),
                    source,
                })?;

        let admin_socket = config.admin_socket.clone();
        prepare_socket_path(&admin_socket).map_err(|source| ServerError::SocketSetup {
            path: admin_socket.clone(),
            source,
        })?;
        let admin_listener =
            UnixListener::bind(&admin_socket).map_err(|source| ServerError::BindUnix {
                path: admin_socket.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            admin_listener,
            admin_socket,
            store,
            registry,
            bus,
            scheduler,
            cancel,
        })
    }

    /// Address the client listener actually bound. With port 0 this is
    /// the only way to learn the assigned port.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the cancellation token fires.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!(
                %addr,
                socket = %self.admin_socket.display(),
                "coordinator listening"
            ),
            Err(_) => info!(socket = %self.admin_socket.display(), "coordinator listening"),
        }

        let forwarder = spawn_bus_forwarder(
            self.bus.subscribe(),
            self.registry.clone(),
            self.cancel.clone(),
        );

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("coordinator shutting down");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = ConnectionHandler::new(
                            Arc::clone(&self.store),
                            self.registry.clone(),
                            self.scheduler.clone(),
                            self.cancel.clone(),
                            peer,
                        );
                        tokio::spawn(async move {
                            if let Err(e) = handler.run(stream).await {
                                warn!(%peer, error = %e, "client connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to accept client connection"),
                },

                accepted = self.admin_listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        tokio::spawn(admin::handle_connection(
                            stream,
                            Arc::clone(&self.store),
                            self.registry.clone(),
                            self.scheduler.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "failed to accept admin connection"),
                },
            }
        }

        let _ = forwarder.await;

        // Leave no socket file behind for the next start to trip over.
        if let Err(e) = fs::remove_file(&self.admin_socket) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.admin_socket.display(), error = %e, "failed to remove admin socket");
            }
        }
        info!("coordinator stopped");
    }
}

/// Creates the socket's parent directory and clears a stale socket file.
fn prepare_socket_path(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale admin socket");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Bridges the notification bus to live sessions.
fn spawn_bus_forwarder(
    mut receiver: broadcast::Receiver<pharma_core::Notificacion>,
    registry: RegistryHandle,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("bus forwarder started");
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                received = receiver.recv() => match received {
                    Ok(notificacion) => {
                        let farmacia = notificacion.farmacia_id;
                        if registry.deliver(farmacia, notificacion).await {
                            info!(farmacia = %farmacia, "notification pushed to live session");
                        } else {
                            debug!(farmacia = %farmacia, "farmacia offline; notification stays in history");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bus forwarder lagged; skipped notifications stay in history");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("bus forwarder stopped");
    })
}
