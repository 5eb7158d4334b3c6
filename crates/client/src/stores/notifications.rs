//! Notification feed built from realtime events.
//!
//! The feed keeps the 50 most recent notifications, newest first, and counts
//! how many are unread. Turning notifications off only silences toasts; the
//! feed keeps recording while attached.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use furioso_shared::{EventKind, Notification, ServerEvent};
use uuid::Uuid;

use crate::util::lock;
use crate::ws::{EventDispatcher, Subscription};

/// Maximum number of retained notifications
pub const FEED_CAPACITY: usize = 50;

/// Receives a notification to show as a transient toast.
pub type ToastSink = Arc<dyn Fn(&Notification) + Send + Sync>;

struct FeedState {
    items: VecDeque<Notification>,
    unread: usize,
    enabled: bool,
}

struct FeedInner {
    state: Mutex<FeedState>,
    toasts: Option<ToastSink>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Bounded, newest-first list of notifications with read/unread state.
///
/// Cloning shares the same feed.
#[derive(Clone)]
pub struct NotificationFeed {
    inner: Arc<FeedInner>,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationFeed {
    /// A feed without toasts.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A feed that shows each new notification through `sink` while enabled.
    pub fn with_toasts<F>(sink: F) -> Self
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        Self::build(Some(Arc::new(sink)))
    }

    fn build(toasts: Option<ToastSink>) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                state: Mutex::new(FeedState {
                    items: VecDeque::with_capacity(FEED_CAPACITY),
                    unread: 0,
                    enabled: true,
                }),
                toasts,
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscribe to every user-facing kind on `dispatcher`, replacing any previous attachment.
    pub fn attach(&self, dispatcher: &EventDispatcher) {
        let subscriptions: Vec<Subscription> = EventKind::ALL
            .iter()
            .copied()
            .filter(|kind| kind.is_notifiable())
            .map(|kind| {
                let feed: Weak<FeedInner> = Arc::downgrade(&self.inner);
                dispatcher.listen(kind, move |event| {
                    if let Some(inner) = feed.upgrade() {
                        NotificationFeed { inner }.record(event);
                    }
                    Ok(())
                })
            })
            .collect();

        let previous = std::mem::replace(&mut *lock(&self.inner.subscriptions), subscriptions);
        drop(previous);
    }

    /// Stop receiving events. Recorded notifications are kept.
    pub fn detach(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.inner.subscriptions));
        drop(subscriptions);
    }

    pub fn is_attached(&self) -> bool {
        !lock(&self.inner.subscriptions).is_empty()
    }

    /// Turn a server event into a notification and prepend it.
    pub fn record(&self, event: &ServerEvent) -> Notification {
        let (title, message) = describe(event);
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            kind: event.kind(),
            title,
            message,
            timestamp: Utc::now().timestamp_millis(),
            read: false,
            data: event.payload_json(),
        };

        let toast = {
            let mut state = lock(&self.inner.state);
            state.items.push_front(notification.clone());
            state.unread += 1;
            while state.items.len() > FEED_CAPACITY {
                if let Some(evicted) = state.items.pop_back() {
                    if !evicted.read {
                        state.unread -= 1;
                    }
                }
            }
            state.enabled
        };

        if toast {
            if let Some(sink) = &self.inner.toasts {
                sink(&notification);
            }
        }
        crate::log_debug!("Notification recorded: {}", notification.title);
        notification
    }

    // --- Preferences ---

    pub fn set_enabled(&self, enabled: bool) {
        lock(&self.inner.state).enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.inner.state).enabled
    }

    // --- Read state ---

    /// Mark one notification as read. Returns `false` if it is unknown or already read.
    pub fn mark_as_read(&self, id: &str) -> bool {
        let mut state = lock(&self.inner.state);
        let Some(item) = state.items.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if item.read {
            return false;
        }
        item.read = true;
        state.unread -= 1;
        true
    }

    pub fn mark_all_as_read(&self) {
        let mut state = lock(&self.inner.state);
        state.items.iter_mut().for_each(|n| n.read = true);
        state.unread = 0;
    }

    /// Delete one notification, read or not.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = lock(&self.inner.state);
        let Some(pos) = state.items.iter().position(|n| n.id == id) else {
            return false;
        };
        if let Some(removed) = state.items.remove(pos) {
            if !removed.read {
                state.unread -= 1;
            }
        }
        true
    }

    pub fn clear(&self) {
        let mut state = lock(&self.inner.state);
        state.items.clear();
        state.unread = 0;
    }

    // --- Queries ---

    /// Snapshot, newest first
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.inner.state).items.iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.inner.state).unread
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.state).items.is_empty()
    }
}

impl PartialEq for NotificationFeed {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for NotificationFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("NotificationFeed")
            .field("len", &state.items.len())
            .field("unread", &state.unread)
            .field("enabled", &state.enabled)
            .finish()
    }
}

/// Title and message shown for an event.
fn describe(event: &ServerEvent) -> (String, String) {
    fn or(value: &Option<String>, fallback: &str) -> String {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    match event {
        ServerEvent::ContentPublished(p) => (
            or(&p.title, "New content"),
            or(&p.description, "New content is available."),
        ),
        ServerEvent::MatchCreated(p) => ("Match scheduled".to_string(), p.headline()),
        ServerEvent::MatchUpdated(p) => ("Match updated".to_string(), p.headline()),
        ServerEvent::MatchStarted(p) => ("Match started".to_string(), p.headline()),
        ServerEvent::MatchEnded(p) => ("Match ended".to_string(), p.headline()),
        ServerEvent::StreamOnline(p) => (
            or(&p.title, "FURIA is live"),
            match &p.channel {
                Some(channel) => format!("{} is streaming now.", channel),
                None => "A stream just went live.".to_string(),
            },
        ),
        ServerEvent::StreamOffline(p) => (
            "Stream ended".to_string(),
            or(&p.title, "The stream went offline."),
        ),
        ServerEvent::ShopItemAdded(p) => (
            or(&p.name, "New item in the shop"),
            or(&p.description, "A new item is available in the shop."),
        ),
        ServerEvent::ShopItemUpdated(p) => (
            or(&p.name, "Shop item updated"),
            or(&p.description, "An item in the shop was updated."),
        ),
        ServerEvent::SurveyPublished(p) => (
            or(&p.title, "New survey"),
            or(&p.description, "A new survey is available."),
        ),
        ServerEvent::RewardEarned(p) => (
            "Reward earned".to_string(),
            match (p.amount, &p.reason) {
                (Some(amount), Some(reason)) => format!("+{} coins: {}", amount, reason),
                (Some(amount), None) => format!("+{} coins", amount),
                (None, _) => or(&p.reason, "You earned a reward."),
            },
        ),
        ServerEvent::RedemptionStatusChanged(p) => (
            "Redemption updated".to_string(),
            match (&p.item_name, &p.status) {
                (Some(item), Some(status)) => format!("{}: {}", item, status),
                (None, Some(status)) => format!("Status: {}", status),
                _ => "Your redemption status changed.".to_string(),
            },
        ),
        ServerEvent::Error(p) => (
            "Error".to_string(),
            or(&p.message, "Something went wrong."),
        ),
    }
}
