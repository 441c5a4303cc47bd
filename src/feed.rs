// file: src/feed.rs
// description: Live notification feed: self-expiring alerts from push events plus the persisted notification list

use crate::{
    api::ApiClient,
    channel::PushChannel,
    error::ApiError,
    events::{ClientEvent, EventSender, publish},
    monitoring,
    types::{PersistedNotification, PushEvent, Topic, TransientAlert},
};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// The backend calls the feed depends on.
pub trait NotificationBackend: Send + Sync + 'static {
    fn fetch_notifications(
        &self,
    ) -> impl Future<Output = Result<Vec<PersistedNotification>, ApiError>> + Send;

    fn mark_as_read(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl NotificationBackend for ApiClient {
    fn fetch_notifications(
        &self,
    ) -> impl Future<Output = Result<Vec<PersistedNotification>, ApiError>> + Send {
        self.notifications()
    }

    fn mark_as_read(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send {
        self.mark_notification_read(id)
    }
}

#[derive(Debug, Default)]
struct FeedState {
    /// Insertion order, most recent last.
    transient: Vec<TransientAlert>,
    /// Server order.
    persisted: Vec<PersistedNotification>,
}

impl FeedState {
    fn unread_count(&self) -> usize {
        self.persisted.iter().filter(|n| !n.is_read).count()
    }
}

struct FeedInner<B> {
    backend: Arc<B>,
    state: Mutex<FeedState>,
    alive: AtomicBool,
    dwell: Duration,
    events: EventSender,
}

impl<B: NotificationBackend> FeedInner<B> {
    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn replace_persisted(&self, notes: Vec<PersistedNotification>) {
        let (total, unread) = {
            let mut state = self.lock();
            state.persisted = notes;
            (state.persisted.len(), state.unread_count())
        };
        self.announce_counts(total, unread);
    }

    fn announce_counts(&self, total: usize, unread: usize) {
        monitoring::UNREAD_GAUGE.set(unread as f64);
        publish(
            &self.events,
            ClientEvent::NotificationsRefreshed { total, unread },
        );
    }

    /// Flips the given ids to read; returns whether anything changed.
    fn flip_read(&self, ids: &HashSet<&str>) -> bool {
        let (changed, total, unread) = {
            let mut state = self.lock();
            let mut changed = false;
            for note in state.persisted.iter_mut() {
                if !note.is_read && ids.contains(note.id.as_str()) {
                    note.is_read = true;
                    changed = true;
                }
            }
            (changed, state.persisted.len(), state.unread_count())
        };
        if changed {
            self.announce_counts(total, unread);
        }
        changed
    }
}

/// Transient alerts plus the durable notification list.
///
/// The two lists are independent: an event may show up in both and they are
/// never reconciled by id.
pub struct LiveFeed<B> {
    inner: Arc<FeedInner<B>>,
}

impl<B> Clone for LiveFeed<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: NotificationBackend> LiveFeed<B> {
    pub fn new(backend: Arc<B>, dwell: Duration, events: EventSender) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                backend,
                state: Mutex::new(FeedState::default()),
                alive: AtomicBool::new(true),
                dwell,
                events,
            }),
        }
    }

    /// Initial bulk fetch of persisted notifications.
    pub async fn load(&self) -> Result<(), ApiError> {
        let notes = self.inner.backend.fetch_notifications().await?;
        if self.inner.is_alive() {
            debug!("Loaded {} notifications", notes.len());
            self.inner.replace_persisted(notes);
        }
        Ok(())
    }

    /// Subscribes the feed to every task topic on `channel`.
    pub fn bind(&self, channel: &PushChannel) {
        for topic in Topic::ALL {
            let feed = self.clone();
            channel.on(topic, move |event| {
                feed.on_push_event(&event);
            });
        }
    }

    /// Removes the subscriptions and stops all later state changes.
    ///
    /// Timers and fetches already in flight still run but find the feed inert.
    pub fn teardown(&self, channel: &PushChannel) {
        for topic in Topic::ALL {
            channel.off(topic);
        }
        self.deactivate();
    }

    pub fn deactivate(&self) {
        self.inner.alive.store(false, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    /// Raises an alert for `event`, schedules its expiry and refreshes the
    /// persisted list in the background. Returns the alert id.
    pub fn on_push_event(&self, event: &PushEvent) -> Option<String> {
        if !self.inner.is_alive() {
            debug!("Feed torn down, ignoring {}", event.topic());
            return None;
        }

        let alert = TransientAlert {
            id: uuid::Uuid::new_v4().to_string(),
            kind: event.kind(),
            message: event.describe(),
            created_at: Utc::now(),
        };
        info!(kind = alert.kind.as_str(), "{}", alert.message);

        self.inner.lock().transient.push(alert.clone());
        let id = alert.id.clone();
        publish(&self.inner.events, ClientEvent::AlertRaised(Arc::new(alert)));

        self.schedule_expiry(id.clone());
        self.spawn_refresh();
        Some(id)
    }

    // One single-shot timer per alert
    fn schedule_expiry(&self, id: String) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            sleep(inner.dwell).await;
            if !inner.is_alive() {
                return;
            }

            let removed = {
                let mut state = inner.lock();
                let before = state.transient.len();
                state.transient.retain(|alert| alert.id != id);
                state.transient.len() != before
            };
            if removed {
                monitoring::ALERTS_EXPIRED_COUNTER.increment(1);
                publish(&inner.events, ClientEvent::AlertExpired { id });
            }
        });
    }

    // Fire-and-forget; whichever fetch resolves last wins
    fn spawn_refresh(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            match inner.backend.fetch_notifications().await {
                Ok(notes) if inner.is_alive() => inner.replace_persisted(notes),
                Ok(_) => {}
                Err(e) => warn!("Failed to refresh notifications: {}", e),
            }
        });
    }

    /// Marks one notification read on the backend, then locally.
    pub async fn mark_as_read(&self, id: &str) -> Result<(), ApiError> {
        self.inner.backend.mark_as_read(id).await?;
        if self.inner.is_alive() {
            self.inner.flip_read(&HashSet::from([id]));
        }
        Ok(())
    }

    /// Marks every unread notification read, concurrently.
    ///
    /// The local flip is all-or-nothing: if any call fails, nothing is flipped
    /// even for the calls that succeeded, and the first error is returned.
    pub async fn mark_all_as_read(&self) -> Result<usize, ApiError> {
        let unread: Vec<String> = self
            .inner
            .lock()
            .persisted
            .iter()
            .filter(|n| !n.is_read)
            .map(|n| n.id.clone())
            .collect();

        if unread.is_empty() {
            return Ok(0);
        }

        let results = join_all(
            unread
                .iter()
                .map(|id| self.inner.backend.mark_as_read(id)),
        )
        .await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if let Some(err) = results.into_iter().find_map(Result::err) {
            warn!(
                "{} of {} mark-as-read calls failed, leaving local state unchanged",
                failures,
                unread.len()
            );
            return Err(err);
        }

        if self.inner.is_alive() {
            self.inner
                .flip_read(&unread.iter().map(String::as_str).collect());
        }
        Ok(unread.len())
    }

    pub fn transient(&self) -> Vec<TransientAlert> {
        self.inner.lock().transient.clone()
    }

    pub fn persisted(&self) -> Vec<PersistedNotification> {
        self.inner.lock().persisted.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.lock().unread_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::create_event_channel;
    use crate::types::{NotificationKind, TaskEventPayload};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    const DWELL: Duration = Duration::from_secs(10);

    #[derive(Default)]
    struct FakeBackend {
        notes: Mutex<Vec<PersistedNotification>>,
        failing_ids: Mutex<HashSet<String>>,
        fail_fetch: AtomicBool,
        fetch_calls: AtomicUsize,
        mark_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn with_notes(notes: Vec<PersistedNotification>) -> Arc<Self> {
            let backend = Self::default();
            *backend.notes.lock().unwrap() = notes;
            Arc::new(backend)
        }

        fn fail_on(&self, id: &str) {
            self.failing_ids.lock().unwrap().insert(id.to_string());
        }
    }

    impl NotificationBackend for FakeBackend {
        fn fetch_notifications(
            &self,
        ) -> impl Future<Output = Result<Vec<PersistedNotification>, ApiError>> + Send {
            async move {
                self.fetch_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_fetch.load(Ordering::SeqCst) {
                    return Err(ApiError::Network);
                }
                Ok(self.notes.lock().unwrap().clone())
            }
        }

        fn mark_as_read(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send {
            async move {
                self.mark_calls.fetch_add(1, Ordering::SeqCst);
                if self.failing_ids.lock().unwrap().contains(id) {
                    return Err(ApiError::Network);
                }
                for note in self.notes.lock().unwrap().iter_mut() {
                    if note.id == id {
                        note.is_read = true;
                    }
                }
                Ok(())
            }
        }
    }

    fn note(id: &str, is_read: bool) -> PersistedNotification {
        PersistedNotification {
            id: id.into(),
            kind: NotificationKind::Assigned,
            message: format!("notification {id}"),
            is_read,
            created_at: None,
        }
    }

    fn assigned(title: &str) -> PushEvent {
        PushEvent::Assigned(
            serde_json::from_value::<TaskEventPayload>(json!({
                "message": "New task assigned",
                "task": {
                    "_id": "t1",
                    "title": title,
                    "createdBy": {"_id": "u2", "fullName": "Amy", "role": "manager"}
                }
            }))
            .unwrap(),
        )
    }

    fn feed(backend: Arc<FakeBackend>) -> LiveFeed<FakeBackend> {
        let (events, _rx) = create_event_channel();
        LiveFeed::new(backend, DWELL, events)
    }

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn assigned_event_raises_alert_that_expires_at_dwell() {
        let feed = feed(FakeBackend::with_notes(vec![]));

        feed.on_push_event(&assigned("Ship report"));
        let alerts = feed.transient();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].message.contains("Ship report"));
        assert!(alerts[0].message.contains("Amy"));
        assert_eq!(alerts[0].kind, NotificationKind::Assigned);

        sleep(Duration::from_millis(9_900)).await;
        assert_eq!(feed.transient().len(), 1);

        sleep(Duration::from_millis(200)).await;
        assert!(feed.transient().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_list_tracks_the_last_dwell_window() {
        let feed = feed(FakeBackend::with_notes(vec![]));

        feed.on_push_event(&assigned("a"));
        sleep(Duration::from_secs(4)).await;
        feed.on_push_event(&assigned("b"));
        sleep(Duration::from_secs(4)).await;
        feed.on_push_event(&assigned("c"));

        sleep(Duration::from_secs(1)).await; // t = 9
        assert_eq!(feed.transient().len(), 3);

        sleep(Duration::from_secs(3)).await; // t = 12
        let remaining: Vec<_> = feed.transient().into_iter().map(|a| a.message).collect();
        assert_eq!(remaining, ["\"b\" assigned by Amy (manager)", "\"c\" assigned by Amy (manager)"]);

        sleep(Duration::from_secs(7)).await; // t = 19
        assert!(feed.transient().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn each_event_refreshes_the_persisted_list() {
        let backend = FakeBackend::with_notes(vec![note("n1", false)]);
        let feed = feed(backend.clone());

        feed.on_push_event(&assigned("x"));
        settle().await;

        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(feed.persisted(), vec![note("n1", false)]);
        assert_eq!(feed.unread_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_stale_list() {
        let backend = FakeBackend::with_notes(vec![note("n1", false)]);
        let feed = feed(backend.clone());
        feed.load().await.unwrap();

        backend.notes.lock().unwrap().push(note("n2", false));
        backend.fail_fetch.store(true, Ordering::SeqCst);
        feed.on_push_event(&assigned("x"));
        settle().await;

        assert_eq!(feed.persisted().len(), 1);
        assert_eq!(feed.transient().len(), 1);
    }

    #[tokio::test]
    async fn mark_as_read_flips_only_after_success() {
        let backend = FakeBackend::with_notes(vec![note("n1", false), note("n2", false)]);
        backend.fail_on("n2");
        let feed = feed(backend.clone());
        feed.load().await.unwrap();

        feed.mark_as_read("n1").await.unwrap();
        assert_eq!(feed.unread_count(), 1);

        let err = feed.mark_as_read("n2").await.unwrap_err();
        assert_eq!(err, ApiError::Network);
        assert_eq!(feed.unread_count(), 1);
        assert!(!feed.persisted()[1].is_read);
    }

    #[tokio::test]
    async fn mark_as_read_is_idempotent() {
        let backend = FakeBackend::with_notes(vec![note("n1", true)]);
        let feed = feed(backend);
        feed.load().await.unwrap();

        let before = feed.persisted();
        feed.mark_as_read("n1").await.unwrap();
        feed.mark_as_read("n1").await.unwrap();
        assert_eq!(feed.persisted(), before);
        assert_eq!(feed.unread_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_mark_as_read_both_flip() {
        let backend =
            FakeBackend::with_notes(vec![note("n1", false), note("n2", false), note("n3", false)]);
        let feed = feed(backend);
        feed.load().await.unwrap();
        assert_eq!(feed.unread_count(), 3);

        let (a, b) = tokio::join!(feed.mark_as_read("n1"), feed.mark_as_read("n2"));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(feed.unread_count(), 1);
    }

    #[tokio::test]
    async fn mark_all_as_read_flips_everything_on_success() {
        let backend = FakeBackend::with_notes(vec![note("n1", false), note("n2", true), note("n3", false)]);
        let feed = feed(backend.clone());
        feed.load().await.unwrap();

        assert_eq!(feed.mark_all_as_read().await.unwrap(), 2);
        assert!(feed.persisted().iter().all(|n| n.is_read));
        // Already-read entries are not sent again
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mark_all_as_read_is_all_or_nothing() {
        let backend = FakeBackend::with_notes(vec![note("n1", false), note("n2", false)]);
        backend.fail_on("n2");
        let feed = feed(backend.clone());
        feed.load().await.unwrap();
        let before = feed.persisted();

        assert!(feed.mark_all_as_read().await.is_err());
        assert_eq!(feed.persisted(), before);
        assert_eq!(feed.unread_count(), 2);
        assert_eq!(backend.mark_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn torn_down_feed_ignores_timers_and_events() {
        let backend = FakeBackend::with_notes(vec![note("n1", false)]);
        let feed = feed(backend.clone());

        feed.on_push_event(&assigned("x"));
        feed.deactivate();
        sleep(DWELL + Duration::from_secs(1)).await;

        // The pending timer fired against an inert feed
        assert_eq!(feed.transient().len(), 1);
        assert!(feed.persisted().is_empty());
        assert!(feed.on_push_event(&assigned("y")).is_none());
        assert_eq!(backend.fetch_calls.load(Ordering::SeqCst), 1);
    }
}
