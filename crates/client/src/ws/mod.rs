//! Realtime events for QG FURIOSO.
//!
//! This module provides:
//! - A single persistent WebSocket with auto-reconnect and keepalive
//! - Session binding over an HTTP side channel
//! - Typed fan-out of server events to any number of subscribers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      WsClient                       │
//! │   (connect / authenticate / send / disconnect)      │
//! └─────────────────────────────────────────────────────┘
//!        │                 │                    │
//!        ▼                 ▼                    ▼
//!  ┌────────────┐  ┌───────────────┐  ┌──────────────────┐
//!  │ Connector  │  │ SessionBinder │  │ ReconnectPolicy  │
//!  │ (socket)   │  │ (POST auth)   │  │ + TimerSlots     │
//!  └────────────┘  └───────────────┘  └──────────────────┘
//!        │
//!        ▼ frames
//!  ┌─────────────────────┐
//!  │   EventDispatcher   │
//!  └─────────────────────┘
//!        │
//!   ┌────┴─────────────┬──────────────────┐
//!   ▼                  ▼                  ▼
//! ┌──────────────┐ ┌────────────┐ ┌────────────┐
//! │ Notification │ │ Component  │ │ Component  │
//! │ Feed         │ │            │ │            │
//! └──────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = WsClient::new(WsConfig::from_env());
//! let feed = NotificationFeed::new();
//! feed.attach(client.events());
//!
//! client.connect().await?;
//! client.authenticate().await?;
//! ```

mod auth;
mod client;
mod config;
mod connection;
mod dispatcher;
#[cfg(feature = "ui")]
mod hooks;
mod reconnect;
mod timer;

pub use auth::{HttpSessionBinder, SessionBinder};
pub use client::{ConnectionState, WsClient, WsClientBuilder};
pub use config::WsConfig;
pub use connection::{
    CloseInfo, Connector, DefaultConnector, EventSink, Outgoing, Socket, SocketEvent, SocketPeer,
    WsHandle,
};
pub use dispatcher::{subscriber, EventDispatcher, Subscriber, Subscription};
#[cfg(feature = "ui")]
pub use hooks::{
    use_latest_event, use_notification_feed, use_notification_feed_provider, use_ws_client,
    use_ws_event, use_ws_provider,
};
pub use reconnect::{ReconnectConfig, ReconnectPlan, ReconnectPolicy};
pub use timer::TimerSlot;
