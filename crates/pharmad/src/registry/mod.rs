//! Session registry using the actor pattern.
//!
//! The registry is the single owner of "which farmacia is connected right
//! now". It receives commands over a tokio mpsc channel and enforces the
//! one-live-session-per-farmacia rule at admission time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Connection tasks │────▶│  RegistryActor  │────▶│ Broadcast channel │
//! └──────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                        │                        │
//!         │   RegistryCommand      │   SessionEvent         │
//!         │   (mpsc channel)       │   (broadcast)          │
//!         ▼                        ▼                        ▼
//!    Admit / Remove /        HashMap<identity,        Lifecycle
//!    Deliver / ForceClose    SessionEntry>            subscribers
//! ```
//!
//! Sessions are purely in-memory: a daemon restart empties the registry
//! and clients simply reconnect.

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use commands::{RegistryCommand, RegistryError, SessionEvent, SessionView};
pub use handle::RegistryHandle;

use actor::RegistryActor;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawns the registry actor and returns a handle for interaction.
///
/// The actor stops once every handle clone is dropped; there is no
/// periodic sweep because disconnects remove their session deterministically.
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
