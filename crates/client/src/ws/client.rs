//! The realtime connection service.
//!
//! One [`WsClient`] owns one physical socket at a time and is shared (by
//! cloning) with everything in the app that wants live events. It is built
//! at the app root and passed down; there is no global instance.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use furioso_shared::{
    parse_frame, try_problem_detail, ApiError, EventKind, EventPayload, Frame, FrameError,
    Inbound, RealtimeError, ServerEvent, SystemFrame,
};
use futures_channel::{mpsc::UnboundedReceiver, oneshot};
use futures_util::future::{select, Either};
use futures_util::StreamExt;
use serde_json::Value;
use uuid::Uuid;

use super::auth::{HttpSessionBinder, SessionBinder};
use super::config::WsConfig;
use super::connection::{CloseInfo, Connector, DefaultConnector, Socket, SocketEvent, WsHandle};
use super::dispatcher::{EventDispatcher, Subscriber, Subscription};
use super::reconnect::{ReconnectPlan, ReconnectPolicy};
use super::timer::TimerSlot;
use crate::api_client::ApiClient;
use crate::runtime;
use crate::util::lock;

/// Connection state for a WebSocket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Everything tied to the current physical socket.
struct Link {
    socket: Option<WsHandle>,
    /// Bumped whenever the socket is replaced or dropped; events from older
    /// sockets are ignored
    generation: u64,
    connected: bool,
    authenticated: bool,
    /// Re-run the handshake after an automatic reconnect
    resume_auth: bool,
    client_id: Option<String>,
    state: ConnectionState,
    last_error: Option<String>,
}

struct PendingAuth {
    id: u64,
    verdict: oneshot::Sender<Result<(), RealtimeError>>,
}

struct Inner {
    config: WsConfig,
    connector: Arc<dyn Connector>,
    binder: Arc<dyn SessionBinder>,
    dispatcher: EventDispatcher,
    link: Mutex<Link>,
    policy: Mutex<ReconnectPolicy>,
    pending_auth: Mutex<Option<PendingAuth>>,
    handshakes: AtomicU64,
    reconnect_timer: TimerSlot,
    keepalive: TimerSlot,
}

/// Realtime client: connection lifecycle, handshake, keepalive and event fan-out.
///
/// ```rust,ignore
/// let client = WsClient::new(WsConfig::from_env());
/// let _sub = client.subscribe(EventKind::RewardEarned, |reward: &RewardPayload| {
///     println!("+{:?} coins", reward.amount);
///     Ok(())
/// });
/// client.connect().await?;
/// client.authenticate().await?;
/// ```
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Inner>,
}

/// Builder for [`WsClient`] with injectable transport and handshake.
pub struct WsClientBuilder {
    config: WsConfig,
    connector: Option<Arc<dyn Connector>>,
    binder: Option<Arc<dyn SessionBinder>>,
    dispatcher: Option<EventDispatcher>,
}

impl WsClientBuilder {
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    pub fn binder(mut self, binder: impl SessionBinder + 'static) -> Self {
        self.binder = Some(Arc::new(binder));
        self
    }

    /// Share an existing registry instead of creating a fresh one
    pub fn dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn build(self) -> WsClient {
        let config = self.config;
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(DefaultConnector::default()),
        };
        let binder: Arc<dyn SessionBinder> = match self.binder {
            Some(binder) => binder,
            None => {
                let api = ApiClient::new()
                    .with_base_url(config.origin.clone())
                    .with_session_cookie(config.session_cookie.clone());
                Arc::new(HttpSessionBinder::new(api, config.auth_path.clone()))
            }
        };
        let policy = ReconnectPolicy::new(config.reconnect.clone());

        WsClient {
            inner: Arc::new(Inner {
                connector,
                binder,
                dispatcher: self.dispatcher.unwrap_or_default(),
                link: Mutex::new(Link {
                    socket: None,
                    generation: 0,
                    connected: false,
                    authenticated: false,
                    resume_auth: false,
                    client_id: None,
                    state: ConnectionState::Disconnected,
                    last_error: None,
                }),
                policy: Mutex::new(policy),
                pending_auth: Mutex::new(None),
                handshakes: AtomicU64::new(0),
                reconnect_timer: TimerSlot::new("reconnect"),
                keepalive: TimerSlot::new("keepalive"),
                config,
            }),
        }
    }
}

impl WsClient {
    /// Client with the platform's socket and the HTTP handshake.
    pub fn new(config: WsConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: WsConfig) -> WsClientBuilder {
        WsClientBuilder {
            config,
            connector: None,
            binder: None,
            dispatcher: None,
        }
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<WsClient> {
        weak.upgrade().map(|inner| WsClient { inner })
    }

    // --- State ---

    pub fn config(&self) -> &WsConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.link).state.clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.link).connected
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner.link).authenticated
    }

    /// Id of the current connection attempt, used to bind it to the session
    pub fn client_id(&self) -> Option<String> {
        lock(&self.inner.link).client_id.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.link).last_error.clone()
    }

    /// Reconnect attempts scheduled since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        lock(&self.inner.policy).attempts()
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.reconnect_timer.is_active()
    }

    fn is_current(&self, generation: u64) -> bool {
        lock(&self.inner.link).generation == generation
    }

    // --- Subscriptions ---

    pub fn events(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn on(&self, kind: EventKind, callback: &Subscriber) -> bool {
        self.inner.dispatcher.on(kind, callback)
    }

    pub fn off(&self, kind: EventKind, callback: &Subscriber) -> bool {
        self.inner.dispatcher.off(kind, callback)
    }

    pub fn listen<F>(&self, kind: EventKind, f: F) -> Subscription
    where
        F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.listen(kind, f)
    }

    pub fn subscribe<P, F>(&self, kind: EventKind, f: F) -> Subscription
    where
        P: EventPayload,
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(kind, f)
    }

    // --- Lifecycle ---

    /// Open a new socket, replacing the current one.
    ///
    /// Cancels a pending automatic reconnect. Callers should not run two
    /// `connect()` calls at once; the later one wins and the earlier fails.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        if self.inner.reconnect_timer.cancel() {
            crate::log_debug!("Pending reconnect replaced by manual connect");
        }
        {
            let mut link = lock(&self.inner.link);
            link.state = ConnectionState::Connecting;
            // Only automatic reconnects resume a previous session
            link.resume_auth = false;
        }
        self.open_socket().await
    }

    async fn open_socket(&self) -> Result<(), RealtimeError> {
        let url = match self.inner.config.endpoint_url() {
            Ok(url) => url,
            Err(e) => {
                lock(&self.inner.link).last_error = Some(e.to_string());
                return Err(e);
            }
        };
        let client_id = Uuid::new_v4().to_string();

        let (generation, previous) = {
            let mut link = lock(&self.inner.link);
            link.generation += 1;
            link.connected = false;
            link.authenticated = false;
            link.client_id = Some(client_id.clone());
            if !matches!(link.state, ConnectionState::Reconnecting { .. }) {
                link.state = ConnectionState::Connecting;
            }
            (link.generation, link.socket.take())
        };
        self.inner.keepalive.cancel();
        self.fail_pending_auth(RealtimeError::NotConnected);
        if let Some(previous) = previous {
            crate::log_debug!("Closing previous socket before reconnecting");
            previous.close();
        }

        crate::log_info!("Connecting to {} (client {})", url, client_id);
        let opened = self.inner.connector.open(url.as_str()).await;

        let mut link = lock(&self.inner.link);
        if link.generation != generation {
            drop(link);
            if let Ok(socket) = opened {
                socket.handle.close();
            }
            crate::log_debug!("Connection attempt to {} superseded", url);
            return Err(RealtimeError::Transport(
                "connection attempt superseded".to_string(),
            ));
        }

        match opened {
            Ok(Socket { handle, events }) => {
                link.socket = Some(handle);
                link.connected = true;
                link.state = ConnectionState::Connected;
                link.last_error = None;
                drop(link);

                lock(&self.inner.policy).reset();
                self.start_keepalive(generation);
                self.spawn_pump(generation, events);
                crate::log_info!("WebSocket connected to {}", url);
                Ok(())
            }
            Err(e) => {
                link.last_error = Some(e.to_string());
                link.client_id = None;
                if !matches!(link.state, ConnectionState::Reconnecting { .. }) {
                    link.state = ConnectionState::Disconnected;
                }
                drop(link);
                crate::log_error!("WebSocket error for {}: {}", url, e);
                Err(e)
            }
        }
    }

    /// Tear the connection down. Idempotent; never triggers a reconnect.
    pub fn disconnect(&self) {
        self.inner.reconnect_timer.cancel();
        self.inner.keepalive.cancel();

        let socket = {
            let mut link = lock(&self.inner.link);
            link.generation += 1;
            link.connected = false;
            link.authenticated = false;
            link.resume_auth = false;
            link.client_id = None;
            link.state = ConnectionState::Disconnected;
            link.socket.take()
        };
        lock(&self.inner.policy).reset();
        self.fail_pending_auth(RealtimeError::NotConnected);

        if let Some(socket) = socket {
            socket.close();
            crate::log_info!("WebSocket disconnected");
        }
    }

    /// Best-effort send of `{type, payload, timestamp}`. Returns `false` unless the socket is open.
    pub fn send(&self, kind: &str, payload: Value) -> bool {
        self.send_frame(&Frame::new(kind, payload))
    }

    fn send_frame(&self, frame: &Frame) -> bool {
        let Some(socket) = lock(&self.inner.link).socket.clone() else {
            return false;
        };
        match frame.to_json() {
            Ok(json) => socket.send_text(json),
            Err(e) => {
                crate::log_error!("Failed to encode `{}` frame: {}", frame.kind, e);
                false
            }
        }
    }

    // --- Handshake ---

    /// Bind the current socket to the cookie session.
    ///
    /// Fails immediately with [`RealtimeError::NotConnected`] when no socket is
    /// open. Succeeds on a 2xx from the auth endpoint or an `auth_success`
    /// frame, fails on a rejection, an `auth_error` frame, or after
    /// `auth_timeout`.
    pub async fn authenticate(&self) -> Result<(), RealtimeError> {
        let (generation, client_id) = {
            let link = lock(&self.inner.link);
            match (&link.socket, &link.client_id) {
                (Some(socket), Some(client_id)) if link.connected && socket.is_open() => {
                    (link.generation, client_id.clone())
                }
                _ => return Err(RealtimeError::NotConnected),
            }
        };

        let id = self.inner.handshakes.fetch_add(1, Ordering::SeqCst);
        let (verdict_tx, verdict_rx) = oneshot::channel();
        let superseded = lock(&self.inner.pending_auth).replace(PendingAuth {
            id,
            verdict: verdict_tx,
        });
        if let Some(previous) = superseded {
            let _ = previous.verdict.send(Err(RealtimeError::Auth(
                "superseded by a newer handshake".to_string(),
            )));
        }

        crate::log_debug!("Authenticating client {}", client_id);
        let binder = self.inner.binder.clone();
        let exchange = async move {
            let request = binder.bind(&client_id);
            match select(request, verdict_rx).await {
                Either::Left((Ok(()), _)) => Ok(()),
                Either::Left((Err(ApiError::Http { status, body }), _)) => {
                    Err(RealtimeError::Auth(
                        try_problem_detail(&body).unwrap_or_else(|| format!("HTTP {}", status)),
                    ))
                }
                Either::Left((Err(e), _)) => Err(RealtimeError::Api(e)),
                Either::Right((Ok(verdict), _)) => verdict,
                Either::Right((Err(_canceled), _)) => Err(RealtimeError::NotConnected),
            }
        };

        let timeout = self.inner.config.auth_timeout;
        let outcome = runtime::timeout(timeout, exchange)
            .await
            .unwrap_or(Err(RealtimeError::AuthTimeout(timeout)));

        {
            let mut pending = lock(&self.inner.pending_auth);
            if pending.as_ref().is_some_and(|p| p.id == id) {
                pending.take();
            }
        }

        match outcome {
            Ok(()) => {
                let mut link = lock(&self.inner.link);
                if link.generation != generation || !link.connected {
                    return Err(RealtimeError::NotConnected);
                }
                link.authenticated = true;
                link.resume_auth = true;
                drop(link);
                crate::log_info!("WebSocket authenticated");
                Ok(())
            }
            Err(e) => {
                if matches!(e, RealtimeError::AuthTimeout(_)) {
                    crate::log_warn!("WebSocket authentication timed out");
                } else {
                    crate::log_warn!("WebSocket authentication failed: {}", e);
                }
                let mut link = lock(&self.inner.link);
                if matches!(e, RealtimeError::Auth(_)) {
                    link.resume_auth = false;
                }
                link.last_error = Some(e.to_string());
                drop(link);
                Err(e)
            }
        }
    }

    fn fail_pending_auth(&self, error: RealtimeError) {
        let pending = lock(&self.inner.pending_auth).take();
        if let Some(pending) = pending {
            let _ = pending.verdict.send(Err(error));
        }
    }

    fn on_auth_frame(&self, generation: u64, verdict: Result<(), RealtimeError>) {
        {
            let mut link = lock(&self.inner.link);
            if link.generation != generation {
                return;
            }
            link.authenticated = verdict.is_ok();
            link.resume_auth = verdict.is_ok();
        }
        if let Err(e) = &verdict {
            crate::log_warn!("Server rejected authentication: {}", e);
        }
        let pending = lock(&self.inner.pending_auth).take();
        if let Some(pending) = pending {
            let _ = pending.verdict.send(verdict);
        }
    }

    // --- Socket events ---

    fn start_keepalive(&self, generation: u64) {
        let weak = self.downgrade();
        self.inner
            .keepalive
            .every(self.inner.config.keepalive_interval, move || {
                let Some(client) = WsClient::upgrade(&weak) else {
                    return;
                };
                if client.is_current(generation) && !client.send_frame(&Frame::ping()) {
                    crate::log_debug!("Keepalive ping skipped: socket not open");
                }
            });
    }

    fn spawn_pump(&self, generation: u64, mut events: UnboundedReceiver<SocketEvent>) {
        let weak = self.downgrade();
        runtime::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(client) = WsClient::upgrade(&weak) else {
                    return;
                };
                match event {
                    SocketEvent::Text(text) => client.handle_text(generation, &text),
                    SocketEvent::Closed(info) => {
                        client.handle_close(generation, info);
                        return;
                    }
                }
            }
            if let Some(client) = WsClient::upgrade(&weak) {
                client.handle_close(generation, CloseInfo::abnormal("event stream ended"));
            }
        });
    }

    fn handle_text(&self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            return;
        }
        match parse_frame(text) {
            Ok(Inbound::System(SystemFrame::Ping)) => {
                if !self.send_frame(&Frame::pong()) {
                    crate::log_warn!("Could not answer ping: socket not open");
                }
            }
            Ok(Inbound::System(SystemFrame::Pong)) => crate::log_debug!("Received pong"),
            Ok(Inbound::System(SystemFrame::AuthSuccess)) => self.on_auth_frame(generation, Ok(())),
            Ok(Inbound::System(SystemFrame::AuthError { message })) => {
                self.on_auth_frame(generation, Err(RealtimeError::Auth(message)))
            }
            Ok(Inbound::Event { event, .. }) => {
                self.inner.dispatcher.dispatch(&event);
            }
            Err(FrameError::UnknownType(kind)) => {
                crate::log_debug!("Ignoring frame of unknown type `{}`", kind)
            }
            Err(e) => crate::log_warn!("Dropping frame: {}", e),
        }
    }

    fn handle_close(&self, generation: u64, info: CloseInfo) {
        {
            let mut link = lock(&self.inner.link);
            if link.generation != generation {
                crate::log_debug!("Ignoring close of superseded socket: {}", info);
                return;
            }
            link.socket = None;
            link.connected = false;
            link.authenticated = false;
            link.client_id = None;
            link.state = ConnectionState::Disconnected;
            if !info.clean {
                link.last_error = Some(format!("connection lost: {}", info));
            }
        }
        self.inner.keepalive.cancel();
        self.fail_pending_auth(RealtimeError::Transport(format!("socket closed: {}", info)));

        if info.clean {
            crate::log_info!("WebSocket closed: {}", info);
        } else {
            crate::log_warn!("WebSocket dropped: {}", info);
            self.schedule_reconnect();
        }
    }

    // --- Reconnect ---

    fn schedule_reconnect(&self) {
        let plan = lock(&self.inner.policy).next_attempt();
        let Some(ReconnectPlan { attempt, delay }) = plan else {
            let max_attempts = lock(&self.inner.policy).config().max_attempts;
            let reason = format!("Max reconnect attempts ({}) exceeded", max_attempts);
            crate::log_error!("{}", reason);
            let mut link = lock(&self.inner.link);
            link.last_error = Some(reason.clone());
            link.state = ConnectionState::Failed { reason };
            return;
        };

        lock(&self.inner.link).state = ConnectionState::Reconnecting { attempt };
        crate::log_info!(
            "Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            attempt
        );
        let weak = self.downgrade();
        self.inner.reconnect_timer.once(delay, move || async move {
            if let Some(client) = WsClient::upgrade(&weak) {
                client.reconnect_now().await;
            }
        });
    }

    async fn reconnect_now(&self) {
        match self.open_socket().await {
            Ok(()) => {
                let resume = lock(&self.inner.link).resume_auth;
                if resume {
                    if let Err(e) = self.authenticate().await {
                        crate::log_warn!("Re-authentication after reconnect failed: {}", e);
                    }
                }
            }
            Err(e) => {
                crate::log_warn!("Reconnect attempt failed: {}", e);
                // A manual connect() or disconnect() in the meantime takes over
                if matches!(self.state(), ConnectionState::Reconnecting { .. }) {
                    self.schedule_reconnect();
                }
            }
        }
    }
}

impl PartialEq for WsClient {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for WsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = lock(&self.inner.link);
        f.debug_struct("WsClient")
            .field("state", &link.state)
            .field("authenticated", &link.authenticated)
            .field("client_id", &link.client_id)
            .finish()
    }
}
