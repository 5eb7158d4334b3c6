//! QG FURIOSO realtime client
//!
//! This crate contains the realtime core of the QG FURIOSO fan app: a
//! WebSocket client that keeps one authenticated connection to the backend,
//! fans typed server events out to subscribers, and feeds the notification
//! center. It builds for the browser (wasm32) and for native targets.

// Macros first so every module below can use them
pub mod logging;

pub mod api_client;
pub mod runtime;
pub mod stores;
mod util;
pub mod ws;

pub use api_client::ApiClient;
pub use furioso_shared as shared;
pub use stores::{NotificationFeed, FEED_CAPACITY};
pub use ws::{ConnectionState, EventDispatcher, Subscription, WsClient, WsConfig};
