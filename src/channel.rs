// file: src/channel.rs
// description: Push-channel client: Socket.IO connection, identity registration and topic subscriptions
// reference: https://socket.io/docs/v4/engine-io-protocol/

use crate::{
    channel_state::{ChannelState, SharedChannelState},
    config::{ChannelConfig, MAX_RECONNECT_DELAY_SECS},
    error::TaskMasterError,
    events::{ClientEvent, EventSender, publish},
    monitoring,
    protocol::{self, EnginePacket, SocketPacket},
    types::{PushEvent, Topic},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Callback invoked for each decoded event on a subscribed topic.
pub type EventHandler = Arc<dyn Fn(PushEvent) + Send + Sync>;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

// Used until the server's open packet announces its ping settings
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Default)]
struct Handlers(Arc<std::sync::Mutex<HashMap<Topic, EventHandler>>>);

impl Handlers {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Topic, EventHandler>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, topic: Topic) -> Option<EventHandler> {
        self.lock().get(&topic).cloned()
    }
}

/// Socket.IO endpoint for a server URL: `ws(s)://host/socket.io/?EIO=4&transport=websocket`.
pub fn socket_endpoint(base: &Url) -> Url {
    let mut url = base.clone();
    let scheme = match base.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => other,
    }
    .to_string();
    if url.set_scheme(&scheme).is_err() {
        warn!("Keeping scheme {} for push channel URL", base.scheme());
    }

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    url
}

/// One persistent connection to the notification server.
///
/// The connection is driven by a background worker that reconnects on its
/// own; subscriptions made with [`PushChannel::on`] survive reconnects.
pub struct PushChannel {
    state: SharedChannelState,
    handlers: Handlers,
    identity: watch::Sender<Option<String>>,
    shutdown: watch::Sender<bool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PushChannel {
    /// Opens the channel; must be called inside a tokio runtime.
    pub fn connect(
        config: &ChannelConfig,
        access_token: Option<String>,
        event_sender: EventSender,
    ) -> Self {
        let (identity, identity_rx) = watch::channel(None);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let state: SharedChannelState = Arc::new(Mutex::new(ChannelState::new()));
        let handlers = Handlers::default();

        let worker = ChannelWorker {
            config: config.clone(),
            endpoint: socket_endpoint(&config.url),
            access_token,
            state: state.clone(),
            handlers: handlers.clone(),
            identity: identity_rx,
            shutdown: shutdown_rx,
            event_sender,
            engine_sid: None,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            state,
            handlers,
            identity,
            shutdown,
            worker: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// Announces `identity_id` now if connected, and again after every reconnect.
    /// Repeating the same id is a no-op.
    pub fn register(&self, identity_id: &str) {
        let changed = self.identity.send_if_modified(|current| {
            if current.as_deref() == Some(identity_id) {
                false
            } else {
                *current = Some(identity_id.to_string());
                true
            }
        });
        if changed {
            debug!("Identity {} queued for registration", identity_id);
        }
    }

    pub fn registered_identity(&self) -> Option<String> {
        self.identity.borrow().clone()
    }

    /// Replaces any previous handler for `topic`.
    pub fn on<F>(&self, topic: Topic, handler: F)
    where
        F: Fn(PushEvent) + Send + Sync + 'static,
    {
        self.handlers.lock().insert(topic, Arc::new(handler));
        debug!("Subscribed to {}", topic);
    }

    pub fn off(&self, topic: Topic) {
        if self.handlers.lock().remove(&topic).is_some() {
            debug!("Unsubscribed from {}", topic);
        }
    }

    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.handlers.lock().contains_key(&topic)
    }

    pub fn state(&self) -> SharedChannelState {
        self.state.clone()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.state.lock().await.session_id.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_connected
    }

    /// Stops the worker and waits briefly for it to say goodbye to the server.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(CLOSE_GRACE, handle).await.is_err() {
                warn!("Push channel worker did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

struct ChannelWorker {
    config: ChannelConfig,
    endpoint: Url,
    access_token: Option<String>,
    state: SharedChannelState,
    handlers: Handlers,
    identity: watch::Receiver<Option<String>>,
    shutdown: watch::Receiver<bool>,
    event_sender: EventSender,
    engine_sid: Option<String>,
}

impl ChannelWorker {
    async fn run(mut self) {
        publish(&self.event_sender, ClientEvent::Starting);

        loop {
            match self.connect_and_run().await {
                Ok(()) => {
                    info!("Push channel closed");
                    break;
                }
                Err(e) => {
                    error!("Push channel error: {}", e);
                    publish(&self.event_sender, ClientEvent::ConnectionFailed(e.to_string()));
                    if !self.handle_connection_error().await {
                        break;
                    }
                }
            }
        }

        self.state.lock().await.disconnect();
        monitoring::CONNECTED_GAUGE.set(0.0);
        publish(&self.event_sender, ClientEvent::Stopping);
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn connect_and_run(&mut self) -> Result<(), TaskMasterError> {
        if self.shutdown_requested() {
            return Ok(());
        }
        self.engine_sid = None;

        publish(
            &self.event_sender,
            ClientEvent::Connecting {
                url: self.endpoint.to_string(),
            },
        );

        let mut request = self.endpoint.as_str().into_client_request()?;
        if let Some(token) = &self.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TaskMasterError::InvalidHeader(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let ws_stream = tokio::select! {
            biased;
            _ = self.shutdown.changed() => return Ok(()),
            connected = connect_async(request) => {
                let (ws_stream, _) = connected.map_err(|e| {
                    error!("Failed to connect to push channel: {}", e);
                    TaskMasterError::WebSocketError(e)
                })?;
                ws_stream
            }
        };

        info!("WebSocket connection established to {}", self.endpoint);
        let (mut write, mut read) = ws_stream.split();

        let mut liveness = HANDSHAKE_TIMEOUT;
        let mut deadline = deadline_after(liveness);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    self.say_goodbye(&mut write).await;
                    return Ok(());
                }
                changed = self.identity.changed() => {
                    if changed.is_ok() {
                        self.register_current(&mut write).await?;
                    }
                }
                _ = sleep_until(deadline) => {
                    warn!("No traffic from push server within {:?}", liveness);
                    return Err(TaskMasterError::Timeout);
                }
                message = read.next() => {
                    let Some(message) = message else {
                        publish(&self.event_sender, ClientEvent::Disconnected);
                        return Err(TaskMasterError::ConnectionClosed);
                    };

                    match message? {
                        Message::Text(text) => {
                            self.handle_text(text.as_str(), &mut write, &mut liveness).await?;
                        }
                        Message::Binary(data) => {
                            debug!("Ignoring binary frame of {} bytes", data.len());
                        }
                        Message::Ping(_) | Message::Pong(_) => {
                            trace!("WebSocket keepalive frame");
                        }
                        Message::Close(frame) => {
                            publish(&self.event_sender, ClientEvent::Disconnected);
                            warn!("Received close frame: {:?}", frame);
                            return Err(TaskMasterError::ConnectionClosed);
                        }
                        Message::Frame(_) => {
                            debug!("Received raw frame");
                        }
                    }
                    deadline = deadline_after(liveness);
                }
            }
        }
    }

    async fn say_goodbye(&self, write: &mut WsSink) {
        let goodbye = EnginePacket::Message(SocketPacket::Disconnect).encode();
        if let Err(e) = write.send(Message::Text(goodbye.into())).await {
            debug!("Failed to send disconnect packet: {}", e);
        }
        if let Err(e) = write.close().await {
            debug!("Failed to close WebSocket: {}", e);
        }
    }

    async fn send_text(&self, write: &mut WsSink, text: String) -> Result<(), TaskMasterError> {
        trace!("Sending frame: {}", text);
        write.send(Message::Text(text.into())).await.map_err(|e| {
            error!("Failed to send frame: {}", e);
            TaskMasterError::WebSocketError(e)
        })
    }

    async fn handle_text(
        &mut self,
        text: &str,
        write: &mut WsSink,
        liveness: &mut Duration,
    ) -> Result<(), TaskMasterError> {
        trace!("Received text frame: {}", text);
        self.state.lock().await.record_message();
        monitoring::MESSAGES_RECEIVED_COUNTER.increment(1);

        let packet = match EnginePacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                return Ok(());
            }
        };

        match packet {
            EnginePacket::Open(handshake) => {
                debug!(
                    "Engine session {} (ping interval {}ms, timeout {}ms)",
                    handshake.sid, handshake.ping_interval, handshake.ping_timeout
                );
                *liveness = handshake.liveness_window();
                self.engine_sid = Some(handshake.sid);
                self.send_text(write, protocol::namespace_connect_frame())
                    .await?;
            }
            EnginePacket::Ping => {
                self.send_text(write, EnginePacket::Pong.encode()).await?;
            }
            EnginePacket::Pong | EnginePacket::Noop | EnginePacket::Upgrade => {}
            EnginePacket::Close => {
                publish(&self.event_sender, ClientEvent::Disconnected);
                return Err(TaskMasterError::ConnectionClosed);
            }
            EnginePacket::Message(SocketPacket::Connect { sid }) => {
                let session_id = sid.or_else(|| self.engine_sid.clone()).unwrap_or_default();
                info!("Push channel connected: {}", session_id);
                self.state.lock().await.reset_connection(session_id.clone());
                monitoring::CONNECTED_GAUGE.set(1.0);
                publish(&self.event_sender, ClientEvent::Connected { session_id });
                self.register_current(write).await?;
            }
            EnginePacket::Message(SocketPacket::Disconnect) => {
                publish(&self.event_sender, ClientEvent::Disconnected);
                return Err(TaskMasterError::ConnectionClosed);
            }
            EnginePacket::Message(SocketPacket::ConnectError { message }) => {
                return Err(TaskMasterError::ConnectRejected { message });
            }
            EnginePacket::Message(SocketPacket::Event { name, data }) => {
                self.dispatch(&name, data).await;
            }
        }
        Ok(())
    }

    /// Sends `register` for the current identity unless this connection already has it.
    async fn register_current(&mut self, write: &mut WsSink) -> Result<(), TaskMasterError> {
        let Some(identity_id) = self.identity.borrow_and_update().clone() else {
            return Ok(());
        };

        if !self.state.lock().await.needs_registration(&identity_id) {
            return Ok(());
        }

        self.send_text(write, protocol::register_frame(&identity_id))
            .await?;
        self.state.lock().await.record_registration(&identity_id);
        info!("Registered identity {} on push channel", identity_id);
        publish(&self.event_sender, ClientEvent::Registered { identity_id });
        Ok(())
    }

    async fn dispatch(&self, name: &str, data: serde_json::Value) {
        let topic = match name.parse::<Topic>() {
            Ok(topic) => topic,
            Err(_) => {
                debug!("Ignoring event '{}'", name);
                return;
            }
        };
        monitoring::PUSH_EVENTS_COUNTER.increment(1);

        let event = match PushEvent::decode(topic, data) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed {} payload: {}", topic, e);
                self.state.lock().await.record_dropped();
                return;
            }
        };

        match self.handlers.get(topic) {
            Some(handler) => {
                handler(event);
                self.state.lock().await.record_dispatch();
            }
            None => debug!("No subscriber for {}", topic),
        }
    }

    /// Returns whether another connection attempt should be made.
    async fn handle_connection_error(&mut self) -> bool {
        if self.shutdown_requested() {
            return false;
        }

        let attempt = self.state.lock().await.increment_reconnect();
        monitoring::CONNECTED_GAUGE.set(0.0);
        monitoring::RECONNECT_COUNTER.increment(1);

        let max = self.config.max_reconnects;
        if max > 0 && attempt > max {
            error!(
                "{}",
                TaskMasterError::MaxReconnectsExceeded
            );
            return false;
        }

        let delay = with_jitter(self.config.reconnect_delay);
        warn!(
            "Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            attempt
        );
        publish(
            &self.event_sender,
            ClientEvent::Reconnecting {
                attempt,
                delay_ms: delay.as_millis() as u64,
            },
        );

        tokio::select! {
            biased;
            _ = self.shutdown.changed() => false,
            _ = sleep(delay) => true,
        }
    }
}

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(MAX_RECONNECT_DELAY_SECS);

// A far-off deadline stands in for one past the end of the clock
fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + protocol::MAX_LIVENESS_WINDOW)
}

/// Adds up to 25% random jitter so many clients do not reconnect in lockstep.
fn with_jitter(delay: Duration) -> Duration {
    let delay = delay.min(MAX_RECONNECT_DELAY);
    delay.saturating_add(delay.mul_f64(fastrand::f64() * 0.25))
}
