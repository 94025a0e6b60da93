//! Cloneable handle for talking to the registry actor.

use pharma_core::{FarmaciaId, Notificacion};
use pharma_protocol::ServerMessage;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::commands::{RegistryCommand, RegistryError, SessionEvent, SessionView};

/// Handle to the session registry.
///
/// Cloning is cheap; every clone talks to the same actor. Mutating calls
/// surface actor shutdown as [`RegistryError::ChannelClosed`], queries
/// degrade to empty answers instead.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    event_sender: broadcast::Sender<SessionEvent>,
}

impl RegistryHandle {
    pub(super) fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Claims `identity` for a new connection.
    ///
    /// `sender` is where pushed notifications for the session land and
    /// `token` is cancelled if the session is later revoked.
    pub async fn admit(
        &self,
        farmacia_id: FarmaciaId,
        identity: impl Into<String>,
        sender: mpsc::Sender<ServerMessage>,
        token: CancellationToken,
    ) -> Result<(), RegistryError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Admit {
                farmacia_id,
                identity: identity.into(),
                sender,
                token,
                respond_to,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        response.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Releases `identity` when its connection ends.
    pub async fn remove(&self, identity: &str) -> Result<(), RegistryError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Remove {
                identity: identity.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        response.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Snapshots one live session, `None` if there is none (or the actor
    /// is gone).
    pub async fn lookup(&self, identity: &str) -> Option<SessionView> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(RegistryCommand::Lookup {
                identity: identity.to_string(),
                respond_to,
            })
            .await
            .ok()?;
        response.await.ok()?
    }

    /// Revokes a live session. `true` when one was actually closed; a
    /// stopped actor reads as "nothing to close".
    pub async fn force_close(&self, identity: &str) -> bool {
        let (respond_to, response) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::ForceClose {
                identity: identity.to_string(),
                respond_to,
            })
            .await
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Pushes a notification to the farmacia's live session, if any.
    pub async fn deliver(&self, farmacia_id: FarmaciaId, notificacion: Notificacion) -> bool {
        let (respond_to, response) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::Deliver {
                farmacia_id,
                notificacion: Box::new(notificacion),
                respond_to,
            })
            .await
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Identities of the connected farmacias, sorted.
    pub async fn connected(&self) -> Vec<String> {
        let (respond_to, response) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::Connected { respond_to })
            .await
            .is_err()
        {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        let (respond_to, response) = oneshot::channel();
        if self
            .sender
            .send(RegistryCommand::Count { respond_to })
            .await
            .is_err()
        {
            return 0;
        }
        response.await.unwrap_or(0)
    }

    /// Subscribes to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }

    /// False once the actor has stopped.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
