use deskshell_proto::AppEvent;
use tokio::sync::broadcast;
use tracing::debug;

const BROADCAST_CAPACITY: usize = 256;

/// Fans backend events out to every connected window.
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }
}

impl EventPublisher {
    pub fn publish(&self, event: AppEvent) {
        debug!(event = event.name(), "publishing event");
        // No receivers just means no window is connected.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}
