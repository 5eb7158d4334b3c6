//! Scripted transport and handshake for driving a `WsClient` without a network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use furioso_client::shared::{ApiError, Frame, RealtimeError};
use furioso_client::ws::{Connector, Outgoing, SessionBinder, Socket, SocketPeer, WsClient, WsConfig};

pub fn init_logging() {
    furioso_client::logging::init("furioso_client=debug");
}

/// Let spawned tasks run; advances paused time by one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// --- Connector ---

#[derive(Default)]
struct ConnectorScript {
    opens: AtomicUsize,
    refuse: AtomicBool,
    peers: Mutex<Vec<SocketPeer>>,
}

/// Hands out in-memory sockets and keeps their driver ends for the test.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<ConnectorScript>,
}

impl ScriptedConnector {
    /// Number of open attempts so far
    pub fn opens(&self) -> usize {
        self.script.opens.load(Ordering::SeqCst)
    }

    /// Make every following open fail (or succeed again)
    pub fn refuse(&self, refuse: bool) {
        self.script.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Driver end of the most recently opened socket
    pub fn take_peer(&self) -> SocketPeer {
        self.script
            .peers
            .lock()
            .unwrap()
            .pop()
            .expect("no socket was opened")
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, _url: &str) -> Result<Socket, RealtimeError> {
        self.script.opens.fetch_add(1, Ordering::SeqCst);
        if self.script.refuse.load(Ordering::SeqCst) {
            return Err(RealtimeError::Transport("connection refused".to_string()));
        }
        let (socket, peer) = Socket::pair();
        self.script.peers.lock().unwrap().push(peer);
        Ok(socket)
    }
}

// --- Binder ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindReply {
    Accept,
    Reject(u16),
    /// Never answers
    Hang,
}

struct BinderScript {
    calls: AtomicUsize,
    reply: Mutex<BindReply>,
    client_ids: Mutex<Vec<String>>,
}

/// Answers the auth side channel from a script.
#[derive(Clone)]
pub struct ScriptedBinder {
    script: Arc<BinderScript>,
}

impl ScriptedBinder {
    pub fn new(reply: BindReply) -> Self {
        Self {
            script: Arc::new(BinderScript {
                calls: AtomicUsize::new(0),
                reply: Mutex::new(reply),
                client_ids: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn set_reply(&self, reply: BindReply) {
        *self.script.reply.lock().unwrap() = reply;
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.script.client_ids.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionBinder for ScriptedBinder {
    async fn bind(&self, client_id: &str) -> Result<(), ApiError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .client_ids
            .lock()
            .unwrap()
            .push(client_id.to_string());
        let reply = *self.script.reply.lock().unwrap();
        match reply {
            BindReply::Accept => Ok(()),
            BindReply::Reject(status) => Err(ApiError::Http {
                status,
                body: format!(r#"{{"title":"Unauthorized","status":{},"detail":"session expired"}}"#, status),
            }),
            BindReply::Hang => futures_util::future::pending().await,
        }
    }
}

// --- Client ---

pub struct Harness {
    pub client: WsClient,
    pub connector: ScriptedConnector,
    pub binder: ScriptedBinder,
}

pub fn harness(reply: BindReply) -> Harness {
    init_logging();
    let connector = ScriptedConnector::default();
    let binder = ScriptedBinder::new(reply);
    let client = WsClient::builder(WsConfig::new("https://qg.furia.test"))
        .connector(connector.clone())
        .binder(binder.clone())
        .build();
    Harness {
        client,
        connector,
        binder,
    }
}

/// Text frames the client wrote to `peer`, decoded.
pub fn sent_frames(peer: &mut SocketPeer) -> Vec<Frame> {
    std::iter::from_fn(|| peer.try_next_outgoing())
        .filter_map(|out| match out {
            Outgoing::Text(text) => serde_json::from_str(&text).ok(),
            Outgoing::Close => None,
        })
        .collect()
}
