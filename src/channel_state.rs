/// file: src/channel_state.rs
/// description: Connection state of the push channel, separate from the worker logic
use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct ChannelState {
    /// Transport-assigned Engine.IO session id of the live connection.
    pub session_id: Option<String>,
    pub reconnect_count: AtomicU32,
    pub is_connected: bool,
    /// Identity last announced on the current connection.
    pub registered_identity: Option<String>,
    pub last_message_time: Option<Instant>,
    pub total_messages_received: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub events_dropped: AtomicU64,
    pub last_disconnection_time: Option<Instant>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            session_id: None,
            reconnect_count: AtomicU32::new(0),
            is_connected: false,
            registered_identity: None,
            last_message_time: None,
            total_messages_received: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            last_disconnection_time: None,
        }
    }
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_connection(&mut self, session_id: String) {
        self.session_id = Some(session_id);
        self.last_message_time = Some(Instant::now());
        self.is_connected = true;
        self.registered_identity = None;
        self.reconnect_count.store(0, Ordering::Relaxed);
    }

    /// Returns the attempt number of the upcoming reconnect.
    pub fn increment_reconnect(&mut self) -> u32 {
        self.disconnect();
        self.reconnect_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether `identity_id` still needs announcing on this connection.
    pub fn needs_registration(&self, identity_id: &str) -> bool {
        self.is_connected && self.registered_identity.as_deref() != Some(identity_id)
    }

    pub fn record_registration(&mut self, identity_id: &str) {
        self.registered_identity = Some(identity_id.to_string());
    }

    pub fn record_message(&mut self) {
        self.last_message_time = Some(Instant::now());
        self.total_messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disconnect(&mut self) {
        if self.is_connected {
            self.last_disconnection_time = Some(Instant::now());
        }
        self.is_connected = false;
        self.session_id = None;
        self.registered_identity = None;
    }
}

pub type SharedChannelState = Arc<Mutex<ChannelState>>;
