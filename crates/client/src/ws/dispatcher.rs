//! Fan-out of server events to subscribers.
//!
//! The registry maps each [`EventKind`] to its subscribers in registration
//! order. Dispatch works on a snapshot of that list, so a subscriber may
//! subscribe or unsubscribe (itself included) while being called; the change
//! applies from the next event on.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use furioso_shared::{EventKind, EventPayload, ServerEvent};

use crate::util::lock;

/// Callback registered against one [`EventKind`].
///
/// Identity is the `Arc` allocation: registering a clone of the same
/// subscriber twice is a no-op.
pub type Subscriber = Arc<dyn Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync>;

type Registry = HashMap<EventKind, Vec<Subscriber>>;

/// Wrap a closure as a [`Subscriber`].
pub fn subscriber<F>(f: F) -> Subscriber
where
    F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same(a: &Subscriber, b: &Subscriber) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Shared subscription registry. Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `kind`. Returns `false` if it was already registered.
    pub fn on(&self, kind: EventKind, callback: &Subscriber) -> bool {
        let mut registry = lock(&self.registry);
        let subscribers = registry.entry(kind).or_default();
        if subscribers.iter().any(|s| same(s, callback)) {
            return false;
        }
        subscribers.push(callback.clone());
        true
    }

    /// Remove `callback` from `kind`. The kind's entry goes away with its last subscriber.
    pub fn off(&self, kind: EventKind, callback: &Subscriber) -> bool {
        remove(&self.registry, kind, callback)
    }

    /// Register a closure and get back a handle that unsubscribes it on drop.
    pub fn listen<F>(&self, kind: EventKind, f: F) -> Subscription
    where
        F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let callback = subscriber(f);
        self.on(kind, &callback);
        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            callback,
        }
    }

    /// Typed variant of [`listen`](Self::listen): `f` receives the payload
    /// type that belongs to `kind`.
    ///
    /// ```rust,ignore
    /// let _sub = dispatcher.subscribe(EventKind::SurveyPublished, |survey: &SurveyPayload| {
    ///     println!("new survey: {:?}", survey.title);
    ///     Ok(())
    /// });
    /// ```
    pub fn subscribe<P, F>(&self, kind: EventKind, f: F) -> Subscription
    where
        P: EventPayload,
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listen(kind, move |event| match P::from_event(event) {
            Some(payload) => f(payload),
            None => Ok(()),
        })
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        lock(&self.registry).get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Kinds with at least one subscriber
    pub fn kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<EventKind> = lock(&self.registry).keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Deliver `event` to every subscriber of its kind.
    ///
    /// Failing or panicking subscribers are logged and skipped. Returns the
    /// number of subscribers that handled the event successfully.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Subscriber> = match lock(&self.registry).get(&kind) {
            Some(subscribers) => subscribers.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for callback in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => crate::log_error!("Subscriber for {} failed: {:#}", kind, e),
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    crate::log_error!("Subscriber for {} panicked: {}", kind, reason);
                }
            }
        }
        delivered
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = lock(&self.registry);
        let counts: HashMap<EventKind, usize> =
            registry.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventDispatcher")
            .field("subscribers", &counts)
            .finish()
    }
}

fn remove(registry: &Mutex<Registry>, kind: EventKind, callback: &Subscriber) -> bool {
    let mut registry = lock(registry);
    let Some(subscribers) = registry.get_mut(&kind) else {
        return false;
    };
    let before = subscribers.len();
    subscribers.retain(|s| !same(s, callback));
    let removed = subscribers.len() != before;
    if subscribers.is_empty() {
        registry.remove(&kind);
    }
    removed
}

/// A registration made through [`EventDispatcher::listen`]; unsubscribes on drop.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    callback: Subscriber,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Unsubscribe now. Idempotent.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => remove(&registry, self.kind, &self.callback),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("kind", &self.kind).finish()
    }
}
