//! Dioxus hooks for owning the realtime client at the app root.
//!
//! The root component creates the client once with [`use_ws_provider`];
//! everything below reaches it through context.
//!
//! ```rust,ignore
//! fn App() -> Element {
//!     let client = use_ws_provider(|| WsClient::new(WsConfig::from_window()));
//!     use_notification_feed_provider(&client);
//!     rsx! { Router::<Route> {} }
//! }
//!
//! fn MatchTicker() -> Element {
//!     let latest = use_latest_event(EventKind::MatchUpdated);
//!     rsx! { "{latest:?}" }
//! }
//! ```

use std::rc::Rc;

use dioxus::prelude::*;
use furioso_shared::{EventKind, ServerEvent};

use super::client::WsClient;
use super::dispatcher::Subscription;
use crate::stores::NotificationFeed;

/// Provide a client to the component tree, connecting and authenticating on
/// mount and disconnecting when the providing component unmounts.
pub fn use_ws_provider(factory: impl FnOnce() -> WsClient) -> WsClient {
    let client = use_context_provider(factory);

    let on_mount = client.clone();
    use_hook(move || {
        spawn(async move {
            if let Err(e) = on_mount.connect().await {
                crate::log_error!("Realtime connection failed: {}", e);
                return;
            }
            if let Err(e) = on_mount.authenticate().await {
                crate::log_warn!("Realtime authentication failed: {}", e);
            }
        });
    });

    let on_unmount = client.clone();
    use_drop(move || on_unmount.disconnect());

    client
}

/// The client provided by an ancestor.
pub fn use_ws_client() -> WsClient {
    use_context::<WsClient>()
}

/// Subscribe to `kind` for as long as the calling component is mounted.
pub fn use_ws_event<F>(kind: EventKind, f: F)
where
    F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let client = use_ws_client();
    let _subscription: Rc<Subscription> = use_hook(move || Rc::new(client.listen(kind, f)));
}

/// The most recent event of `kind`, as a reactive signal.
pub fn use_latest_event(kind: EventKind) -> SyncSignal<Option<ServerEvent>> {
    let latest = use_signal_sync(|| None);
    use_ws_event(kind, move |event| {
        let mut latest = latest;
        latest.set(Some(event.clone()));
        Ok(())
    });
    latest
}

/// Create a notification feed fed by `client` and provide it to the tree.
pub fn use_notification_feed_provider(client: &WsClient) -> NotificationFeed {
    let client = client.clone();
    use_context_provider(move || {
        let feed = NotificationFeed::new();
        feed.attach(client.events());
        feed
    })
}

/// The notification feed provided by an ancestor.
pub fn use_notification_feed() -> NotificationFeed {
    use_context::<NotificationFeed>()
}
