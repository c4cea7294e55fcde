use std::sync::Mutex;

use parlor_types::events::GatewayEvent;

/// Outbound side of real-time fan-out, injected into every component that
/// mutates state. Publishing is fire-and-forget: implementations must never
/// block the caller or surface delivery failures, since the triggering
/// mutation has already committed by the time `publish` runs.
///
/// For a single operation the events are published in that operation's
/// contract order (e.g. `message_created` before `chat_updated`); nothing
/// is guaranteed across concurrent operations.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, event: GatewayEvent);
}

/// Sink that drops everything. Default for contexts with no gateway.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: GatewayEvent) {}
}

/// Sink that records published events in order, for asserting publish
/// ordering in tests without a live transport.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<GatewayEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<GatewayEvent> {
        std::mem::take(&mut self.events.lock().expect("recording sink poisoned"))
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: GatewayEvent) {
        self.events
            .lock()
            .expect("recording sink poisoned")
            .push(event);
    }
}
