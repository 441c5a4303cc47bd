/// file: src/events.rs
/// description: Event system to decouple channel and feed logic from UI presentation
use crate::types::TransientAlert;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Starting,
    Connecting { url: String },
    Connected { session_id: String },
    Registered { identity_id: String },
    ConnectionFailed(String),
    Reconnecting { attempt: u32, delay_ms: u64 },
    Disconnected,
    AlertRaised(Arc<TransientAlert>),
    AlertExpired { id: String },
    NotificationsRefreshed { total: usize, unread: usize },
    Stopping,
}

// Bounded so a stalled UI cannot grow memory without limit; producers drop on overflow
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub type EventSender = mpsc::Sender<ClientEvent>;
pub type EventReceiver = mpsc::Receiver<ClientEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Non-blocking publish used from synchronous callbacks.
pub fn publish(sender: &EventSender, event: ClientEvent) {
    if let Err(e) = sender.try_send(event) {
        tracing::trace!("Dropping UI event: {}", e);
    }
}
