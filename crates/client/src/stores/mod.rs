//! Client-side state fed by realtime events.

pub mod notifications;

pub use notifications::{NotificationFeed, ToastSink, FEED_CAPACITY};
