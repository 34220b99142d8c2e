pub use kikcore::types::events::*;

use log::trace;
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Fan-out of client events.
///
/// Subscribers get every [`Event`] over a broadcast channel and pick the
/// variants they care about. Synchronous [`EventHandler`]s registered on
/// `core` run inline on the reader task and must not block.
pub struct EventBus {
    events: broadcast::Sender<Arc<Event>>,
    pub core: CoreEventBus,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            events: broadcast::channel(CHANNEL_CAPACITY).0,
            core: CoreEventBus::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.events.subscribe()
    }

    pub fn dispatch(&self, event: Event) {
        self.core.dispatch(&event);
        if self.events.send(Arc::new(event)).is_err() {
            trace!(target: "Client/Events", "Event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
