//! The registry actor: owns all session state and processes commands
//! serially, so admission races resolve in arrival order without locks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pharma_core::{FarmaciaId, Notificacion};
use pharma_protocol::ServerMessage;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::{RegistryCommand, RegistryError, SessionEvent, SessionView};

/// Owned state for one live session.
struct SessionEntry {
    farmacia_id: FarmaciaId,
    sender: mpsc::Sender<ServerMessage>,
    token: CancellationToken,
    connected_at: DateTime<Utc>,
}

/// Actor that owns the session registry state.
pub(super) struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    /// Live sessions keyed by normalized identity.
    sessions: HashMap<String, SessionEntry>,
    /// Reverse index for bus deliveries, which address by id.
    by_farmacia: HashMap<FarmaciaId, String>,
    event_sender: broadcast::Sender<SessionEvent>,
}

impl RegistryActor {
    pub(super) fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
            by_farmacia: HashMap::new(),
            event_sender,
        }
    }

    /// Runs until every command sender is dropped.
    pub(super) async fn run(mut self) {
        info!("session registry started");
        while let Some(command) = self.receiver.recv().await {
            self.handle_command(command);
        }
        info!("session registry stopped");
    }

    fn handle_command(&mut self, command: RegistryCommand) {
        match command {
            RegistryCommand::Admit {
                farmacia_id,
                identity,
                sender,
                token,
                respond_to,
            } => {
                let result = self.admit(farmacia_id, identity, sender, token);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove {
                identity,
                respond_to,
            } => {
                let _ = respond_to.send(self.remove(&identity));
            }
            RegistryCommand::Lookup {
                identity,
                respond_to,
            } => {
                let _ = respond_to.send(self.lookup(&identity));
            }
            RegistryCommand::ForceClose {
                identity,
                respond_to,
            } => {
                let _ = respond_to.send(self.force_close(&identity));
            }
            RegistryCommand::Deliver {
                farmacia_id,
                notificacion,
                respond_to,
            } => {
                let _ = respond_to.send(self.deliver(farmacia_id, *notificacion));
            }
            RegistryCommand::Connected { respond_to } => {
                let _ = respond_to.send(self.connected());
            }
            RegistryCommand::Count { respond_to } => {
                let _ = respond_to.send(self.sessions.len());
            }
        }
    }

    fn admit(
        &mut self,
        farmacia_id: FarmaciaId,
        identity: String,
        sender: mpsc::Sender<ServerMessage>,
        token: CancellationToken,
    ) -> Result<(), RegistryError> {
        // One live session per farmacia. The reverse index also catches a
        // farmacia reconnecting under a just-renamed identity.
        if self.sessions.contains_key(&identity) || self.by_farmacia.contains_key(&farmacia_id) {
            debug!(identity = %identity, "admission rejected: already connected");
            return Err(RegistryError::DuplicateSession(identity));
        }

        let entry = SessionEntry {
            farmacia_id,
            sender,
            token,
            connected_at: Utc::now(),
        };
        self.by_farmacia.insert(farmacia_id, identity.clone());
        self.sessions.insert(identity.clone(), entry);

        info!(
            identity = %identity,
            farmacia = farmacia_id.get(),
            total = self.sessions.len(),
            "session admitted"
        );
        self.publish(SessionEvent::Admitted {
            farmacia_id,
            identity,
        });
        Ok(())
    }

    fn remove(&mut self, identity: &str) -> Result<(), RegistryError> {
        match self.sessions.remove(identity) {
            Some(entry) => {
                self.by_farmacia.remove(&entry.farmacia_id);
                info!(
                    identity = %identity,
                    total = self.sessions.len(),
                    "session removed"
                );
                self.publish(SessionEvent::Removed {
                    identity: identity.to_string(),
                });
                Ok(())
            }
            None => Err(RegistryError::SessionNotFound(identity.to_string())),
        }
    }

    fn lookup(&self, identity: &str) -> Option<SessionView> {
        self.sessions.get(identity).map(|entry| SessionView {
            farmacia_id: entry.farmacia_id,
            identity: identity.to_string(),
            connected_at: entry.connected_at,
        })
    }

    fn force_close(&mut self, identity: &str) -> bool {
        match self.sessions.remove(identity) {
            Some(entry) => {
                self.by_farmacia.remove(&entry.farmacia_id);
                // The connection task observes the token and sends the
                // closing notice itself.
                entry.token.cancel();
                warn!(identity = %identity, "session force-closed");
                self.publish(SessionEvent::ForceClosed {
                    identity: identity.to_string(),
                });
                true
            }
            None => {
                debug!(identity = %identity, "force-close requested for unknown session");
                false
            }
        }
    }

    fn deliver(&self, farmacia_id: FarmaciaId, notificacion: Notificacion) -> bool {
        let Some(identity) = self.by_farmacia.get(&farmacia_id) else {
            return false;
        };
        let Some(entry) = self.sessions.get(identity) else {
            return false;
        };

        // try_send keeps the actor from blocking behind one slow client.
        // The notification row is already persisted, so a full queue only
        // costs the live push.
        match entry.sender.try_send(ServerMessage::notificacion(notificacion)) {
            Ok(()) => true,
            Err(e) => {
                warn!(identity = %identity, error = %e, "live push dropped");
                false
            }
        }
    }

    fn connected(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.sessions.keys().cloned().collect();
        identities.sort();
        identities
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine; events are observability, not state.
        let _ = self.event_sender.send(event);
    }
}
