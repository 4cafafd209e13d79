use crate::udp_traversal::interfaces::{NatEvent, NatEventWaiter};
use async_trait::async_trait;
use tokio::sync::watch;

/// Records the outcome of the host's automatic NAT configuration.
///
/// The port-mapping layer publishes into the tracker; the pinger waits on it once at
/// startup to decide whether punching is needed at all.
pub struct NatEventTracker {
    events: watch::Sender<Option<NatEvent>>,
}

impl NatEventTracker {
    pub fn new() -> Self {
        let (events, _) = watch::channel(None);
        Self { events }
    }

    pub fn publish(&self, event: NatEvent) {
        log::info!(target: "holepunch", "NAT event: {event:?}");
        self.events.send_replace(Some(event));
    }

    pub fn last_event(&self) -> Option<NatEvent> {
        self.events.borrow().clone()
    }
}

impl Default for NatEventTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NatEventWaiter for NatEventTracker {
    /// Resolves with the latest event, waiting for the first one if none was published yet
    async fn wait_for_event(&self) -> NatEvent {
        let mut events = self.events.subscribe();
        loop {
            if let Some(event) = events.borrow_and_update().clone() {
                return event;
            }

            // the sender lives in `self`, so this cannot fail while we are borrowed
            if events.changed().await.is_err() {
                return NatEvent::failure("tracker", "NAT event source closed");
            }
        }
    }
}
