/// file: src/manager.rs
/// description: Process-wide owner of the single push channel, driven by the session lifecycle
use crate::{
    channel::PushChannel,
    config::ChannelConfig,
    events::EventSender,
    session::SessionState,
    types::Identity,
};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

/// Hands out the one push channel of this process.
///
/// Screens receive the manager instead of opening connections themselves, so
/// there is never more than one connection per session.
pub struct ChannelManager {
    config: ChannelConfig,
    events: EventSender,
    current: Mutex<Option<Arc<PushChannel>>>,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig, events: EventSender) -> Self {
        Self {
            config,
            events,
            current: Mutex::new(None),
        }
    }

    /// Returns the open channel, opening it on first use, and registers `identity` on it.
    pub async fn attach(&self, identity: &Identity, access_token: Option<String>) -> Arc<PushChannel> {
        let mut current = self.current.lock().await;

        // A different account gets a fresh connection carrying its own token
        let stale = current.as_ref().is_some_and(|channel| {
            channel
                .registered_identity()
                .is_some_and(|registered| registered != identity.id)
        });
        if stale && let Some(previous) = current.take() {
            info!("Identity changed, reopening push channel");
            previous.close().await;
        }

        let channel = match current.as_ref() {
            Some(channel) => channel.clone(),
            None => {
                info!("Opening push channel to {}", self.config.url);
                let channel = Arc::new(PushChannel::connect(
                    &self.config,
                    access_token,
                    self.events.clone(),
                ));
                *current = Some(channel.clone());
                channel
            }
        };
        channel.register(&identity.id);
        channel
    }

    pub async fn current(&self) -> Option<Arc<PushChannel>> {
        self.current.lock().await.clone()
    }

    /// Closes the channel if one is open.
    pub async fn detach(&self) {
        let channel = self.current.lock().await.take();
        if let Some(channel) = channel {
            info!("Closing push channel");
            channel.close().await;
        }
    }

    /// Applies one session transition: attach on login, detach on logout.
    pub async fn apply(&self, state: &SessionState, access_token: Option<String>) {
        match state {
            SessionState::Loading => debug!("Session loading, channel unchanged"),
            SessionState::Anonymous => self.detach().await,
            SessionState::Authenticated(identity) => {
                self.attach(identity, access_token).await;
            }
        }
    }

    /// Keeps the channel in step with the session until the session store goes away.
    pub async fn follow(
        &self,
        mut session: watch::Receiver<SessionState>,
        token: impl Fn() -> Option<String>,
    ) {
        loop {
            let state = session.borrow_and_update().clone();
            self.apply(&state, token()).await;
            if session.changed().await.is_err() {
                break;
            }
        }
        self.detach().await;
    }
}
