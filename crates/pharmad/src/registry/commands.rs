//! Command, error and event types for the session registry actor.

use chrono::{DateTime, Utc};
use pharma_core::{FarmaciaId, Notificacion};
use pharma_protocol::ServerMessage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// A live session as seen from outside the actor.
///
/// Snapshot only: the outbound sender and cancellation token stay inside
/// the actor.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub farmacia_id: FarmaciaId,
    /// Normalized farmacia name the session was admitted under.
    pub identity: String,
    pub connected_at: DateTime<Utc>,
}

/// Commands accepted by the registry actor.
///
/// Every command carries a `respond_to` oneshot; the actor always answers,
/// and a dropped response channel means the caller went away first.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Claim `identity` for a new connection.
    Admit {
        farmacia_id: FarmaciaId,
        identity: String,
        /// Queue the connection task drains into writes on the socket.
        sender: mpsc::Sender<ServerMessage>,
        /// Cancelled by the actor when the session is revoked.
        token: CancellationToken,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Release `identity` when its connection ends.
    Remove {
        identity: String,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Snapshot one live session.
    Lookup {
        identity: String,
        respond_to: oneshot::Sender<Option<SessionView>>,
    },

    /// Revoke a live session: cancel its token and release the identity.
    /// Answers `true` when a session was actually closed.
    ForceClose {
        identity: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// Push a notification to the farmacia's live session, if any.
    /// Answers `true` only when the message was handed to the session.
    Deliver {
        farmacia_id: FarmaciaId,
        notificacion: Box<Notificacion>,
        respond_to: oneshot::Sender<bool>,
    },

    /// Identities of the connected farmacias, sorted.
    Connected {
        respond_to: oneshot::Sender<Vec<String>>,
    },

    /// Number of live sessions.
    Count { respond_to: oneshot::Sender<usize> },
}

/// Errors produced by registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The identity (or the farmacia behind it) already has a live
    /// session. The new connection must be rejected, not the old one.
    #[error("duplicate session for identity: {0}")]
    DuplicateSession(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The actor is gone; only seen during daemon shutdown.
    #[error("registry channel closed")]
    ChannelClosed,
}

/// Session lifecycle events broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A connection claimed its identity.
    Admitted {
        farmacia_id: FarmaciaId,
        identity: String,
    },

    /// A session disconnected and released its identity.
    Removed { identity: String },

    /// A session was revoked by an administrative action.
    ForceClosed { identity: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_session_display() {
        let err = RegistryError::DuplicateSession("farmacia central".to_string());
        assert_eq!(
            err.to_string(),
            "duplicate session for identity: farmacia central"
        );
    }

    #[test]
    fn test_channel_closed_display() {
        assert_eq!(
            RegistryError::ChannelClosed.to_string(),
            "registry channel closed"
        );
    }

    #[test]
    fn test_session_event_is_cloneable() {
        let event = SessionEvent::Admitted {
            farmacia_id: FarmaciaId::new(1),
            identity: "farmacia norte".to_string(),
        };
        let copy = event.clone();
        match copy {
            SessionEvent::Admitted { identity, .. } => assert_eq!(identity, "farmacia norte"),
            other => panic!("Expected Admitted, got {other:?}"),
        }
    }
}
