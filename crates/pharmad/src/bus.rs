//! In-process notification bus.
//!
//! Job workers publish notifications here after persisting them; the
//! server's forwarder task routes each one to the farmacia's live
//! session. Delivery is at-most-once: a subscriber that lags past the
//! buffer misses the skipped messages, and with no subscriber at all a
//! publish is simply dropped. The store row is the durable copy either way.
//!
//! Per farmacia, messages arrive in publish order, which is the order
//! their rows were persisted in.

use pharma_core::Notificacion;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffer depth before a slow subscriber starts lagging.
const BUS_BUFFER: usize = 100;

/// Handle to the notification bus. Cloning is cheap; every clone
/// publishes into the same channel.
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notificacion>,
}

impl NotificationBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_BUFFER);
        Self { sender }
    }

    /// Publishes a persisted notification. Fire-and-forget.
    pub fn publish(&self, notificacion: Notificacion) {
        let farmacia = notificacion.farmacia_id;
        if self.sender.send(notificacion).is_err() {
            debug!(
                farmacia = farmacia.get(),
                "notification published with no subscribers"
            );
        }
    }

    /// Subscribes to every notification published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notificacion> {
        self.sender.subscribe()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
