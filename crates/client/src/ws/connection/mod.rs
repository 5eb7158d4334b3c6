//! Physical socket abstraction.
//!
//! A [`Connector`] opens one WebSocket and hands back a [`Socket`]: a
//! [`WsHandle`] for writing plus a stream of [`SocketEvent`]s. Both platform
//! implementations bridge their native socket onto the same channel pair, so
//! the connection logic above never touches tungstenite or `web_sys` directly.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use furioso_shared::RealtimeError;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A text frame
    Text(String),
    /// The socket closed; no further events follow
    Closed(CloseInfo),
}

/// Why a socket closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// `true` for an orderly close (code 1000); only unclean closes trigger reconnects
    pub clean: bool,
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseInfo {
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            clean: true,
            code: Some(code),
            reason: reason.into(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            clean: false,
            code: Some(1006),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = if self.reason.is_empty() {
            "no reason"
        } else {
            self.reason.as_str()
        };
        match self.code {
            Some(code) => write!(f, "{} (code {})", reason, code),
            None => f.write_str(reason),
        }
    }
}

/// Outgoing instructions from the client to the socket driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Close,
}

/// Write half of an open socket.
#[derive(Clone)]
pub struct WsHandle {
    sender: UnboundedSender<Outgoing>,
    open: Arc<AtomicBool>,
}

impl WsHandle {
    /// Whether the socket is in the open state
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.sender.is_closed()
    }

    /// Queue a text frame. Returns `false` (and drops the frame) unless the socket is open.
    pub fn send_text(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        self.sender.unbounded_send(Outgoing::Text(text)).is_ok()
    }

    /// Close the socket. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.sender.unbounded_send(Outgoing::Close);
        }
    }
}

impl fmt::Debug for WsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsHandle")
            .field("open", &self.is_open())
            .finish()
    }
}

/// An open socket as seen by the client.
#[derive(Debug)]
pub struct Socket {
    pub handle: WsHandle,
    pub events: UnboundedReceiver<SocketEvent>,
}

/// Reports what the remote side did to the client.
#[derive(Debug, Clone)]
pub struct EventSink {
    events: UnboundedSender<SocketEvent>,
    open: Arc<AtomicBool>,
}

impl EventSink {
    /// Report an inbound text frame. Returns `false` once the client stopped listening.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.events
            .unbounded_send(SocketEvent::Text(text.into()))
            .is_ok()
    }

    /// Report that the socket closed; later pushes are ignored by the client.
    pub fn close(&self, info: CloseInfo) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.events.unbounded_send(SocketEvent::Closed(info));
        self.events.close_channel();
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// The driver's end of a [`Socket`]: what the client wrote, and where to
/// report what the remote side did.
#[derive(Debug)]
pub struct SocketPeer {
    pub outgoing: UnboundedReceiver<Outgoing>,
    pub sink: EventSink,
}

impl SocketPeer {
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.sink.push_text(text)
    }

    pub fn close(&self, info: CloseInfo) {
        self.sink.close(info);
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_open()
    }

    /// Next frame the client queued, without waiting
    pub fn try_next_outgoing(&mut self) -> Option<Outgoing> {
        self.outgoing.try_next().ok().flatten()
    }
}

impl Socket {
    /// An open socket backed by channels, plus the driver's end.
    pub fn pair() -> (Socket, SocketPeer) {
        let (out_tx, out_rx) = unbounded();
        let (ev_tx, ev_rx) = unbounded();
        let open = Arc::new(AtomicBool::new(true));
        let socket = Socket {
            handle: WsHandle {
                sender: out_tx,
                open: open.clone(),
            },
            events: ev_rx,
        };
        let peer = SocketPeer {
            outgoing: out_rx,
            sink: EventSink {
                events: ev_tx,
                open,
            },
        };
        (socket, peer)
    }
}

/// Opens physical sockets.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`, resolving once it is open.
    async fn open(&self, url: &str) -> Result<Socket, RealtimeError>;
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::BrowserConnector as DefaultConnector;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::NativeConnector as DefaultConnector;
