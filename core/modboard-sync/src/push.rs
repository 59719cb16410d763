//! Push channel.
//!
//! One WebSocket connection per session, authenticated with the session's
//! bearer token at handshake. Incoming text frames are decoded into
//! [`PushEvent`]s and handed, in arrival order, to the listeners registered
//! for that exact event name.
//!
//! # States
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──handshake ok──▶ Connected
//!      ▲                          ▲                            │
//!      │                          └──────── drop, retry ───────┘
//!      └──── disconnect(), initial handshake failure, retries exhausted,
//!            session ended
//! ```
//!
//! Events arriving while disconnected are not buffered. A new token (fresh
//! login) reconnects with that token.

use crate::config::ConsoleConfig;
use crate::error::{SyncError, SyncResult};
use crate::session::{Session, SessionContext};
use futures::{SinkExt, StreamExt};
use modboard_types::{EntityKind, EventKind, PushEvent, SubscriptionId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A push listener.
pub type Listener = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Connection state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

/// Identifies one listener registration. Returned by
/// [`PushChannel::subscribe`] and consumed by [`PushChannel::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    event: String,
    id: SubscriptionId,
}

impl SubscriptionHandle {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Callbacks for the event kinds of one entity type. Absent callbacks are
/// not registered.
#[derive(Clone, Default)]
pub struct EntityCallbacks {
    pub on_new: Option<Listener>,
    pub on_updated: Option<Listener>,
    pub on_deleted: Option<Listener>,
    /// Reports only.
    pub on_resolved: Option<Listener>,
}

impl EntityCallbacks {
    /// The same listener for every event kind.
    pub fn all(listener: Listener) -> Self {
        Self {
            on_new: Some(listener.clone()),
            on_updated: Some(listener.clone()),
            on_deleted: Some(listener.clone()),
            on_resolved: Some(listener),
        }
    }

    pub fn on_new(mut self, f: impl Fn(&PushEvent) + Send + Sync + 'static) -> Self {
        self.on_new = Some(Arc::new(f));
        self
    }

    pub fn on_updated(mut self, f: impl Fn(&PushEvent) + Send + Sync + 'static) -> Self {
        self.on_updated = Some(Arc::new(f));
        self
    }

    pub fn on_deleted(mut self, f: impl Fn(&PushEvent) + Send + Sync + 'static) -> Self {
        self.on_deleted = Some(Arc::new(f));
        self
    }

    pub fn on_resolved(mut self, f: impl Fn(&PushEvent) + Send + Sync + 'static) -> Self {
        self.on_resolved = Some(Arc::new(f));
        self
    }

    fn get(&self, kind: EventKind) -> Option<&Listener> {
        match kind {
            EventKind::New => self.on_new.as_ref(),
            EventKind::Updated => self.on_updated.as_ref(),
            EventKind::Deleted => self.on_deleted.as_ref(),
            EventKind::Resolved => self.on_resolved.as_ref(),
        }
    }
}

impl fmt::Debug for EntityCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCallbacks")
            .field("on_new", &self.on_new.is_some())
            .field("on_updated", &self.on_updated.is_some())
            .field("on_deleted", &self.on_deleted.is_some())
            .field("on_resolved", &self.on_resolved.is_some())
            .finish()
    }
}

/// All registrations made by one [`PushChannel::subscribe_entity`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySubscription {
    kind: EntityKind,
    handles: Vec<SubscriptionHandle>,
}

impl EntitySubscription {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn handles(&self) -> &[SubscriptionHandle] {
        &self.handles
    }
}

/// The shared push connection.
pub struct PushChannel {
    url: String,
    session: SessionContext,
    handshake_timeout: Duration,
    reconnect_delay: Duration,
    reconnect_attempts: u32,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    state: watch::Sender<ChannelState>,
    listeners: RwLock<HashMap<String, Vec<(SubscriptionId, Listener)>>>,
}

impl PushChannel {
    pub fn new(config: &ConsoleConfig, session: SessionContext) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            url: config.push_url.clone(),
            session,
            handshake_timeout: config.request_timeout(),
            reconnect_delay: config.reconnect_delay(),
            reconnect_attempts: config.reconnect_attempts,
            shared: Arc::new(Shared {
                state,
                listeners: RwLock::new(HashMap::new()),
            }),
            task: Mutex::new(None),
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Opens the connection and waits for the first handshake.
    ///
    /// Returns the current state without doing anything if the channel is
    /// already connecting or connected. Fails with
    /// [`SyncError::MissingCredential`] if the session holds no token.
    pub async fn connect(&self) -> SyncResult<ChannelState> {
        if self.session.token().is_none() {
            return Err(SyncError::MissingCredential);
        }

        let ready = {
            let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.state();
            if current != ChannelState::Disconnected {
                debug!("Push channel already {current:?}");
                return Ok(current);
            }
            if let Some(old) = task.take() {
                old.abort();
            }

            self.shared.set_state(ChannelState::Connecting);
            let (ready_tx, ready_rx) = oneshot::channel();
            let connection = Connection {
                url: self.url.clone(),
                session: self.session.clone(),
                handshake_timeout: self.handshake_timeout,
                reconnect_delay: self.reconnect_delay,
                reconnect_attempts: self.reconnect_attempts,
                shared: self.shared.clone(),
            };
            *task = Some(tokio::spawn(connection.run(ready_tx)));
            ready_rx
        };

        match ready.await {
            Ok(Ok(())) => Ok(ChannelState::Connected),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SyncError::ChannelClosed),
        }
    }

    /// Tears down the connection (even mid-reconnect) and clears all
    /// listener registrations.
    pub fn disconnect(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if self.state() != ChannelState::Disconnected {
            info!("Push channel disconnected");
        }
        self.shared.set_state(ChannelState::Disconnected);
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    // ── Listeners ────────────────────────────────────────────────

    /// Registers `callback` for events named `event`.
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.subscribe_listener(event.into(), Arc::new(callback))
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut listeners = self
            .shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(&handle.event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| *id != handle.id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&handle.event);
        }
        if removed {
            debug!("Unsubscribed {} from {}", handle.id, handle.event);
        }
        removed
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.shared
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Registers callbacks for every event kind `kind` emits.
    pub fn subscribe_entity(&self, kind: EntityKind, callbacks: EntityCallbacks) -> EntitySubscription {
        let handles = kind
            .event_kinds()
            .iter()
            .filter_map(|&event| {
                let listener = callbacks.get(event)?.clone();
                Some(self.subscribe_listener(kind.event_name(event), listener))
            })
            .collect();
        EntitySubscription { kind, handles }
    }

    /// Removes every registration of an entity subscription.
    pub fn unsubscribe_entity(&self, subscription: EntitySubscription) {
        for handle in subscription.handles {
            self.unsubscribe(handle);
        }
    }

    /// Delivers an event to its listeners as if it had arrived on the
    /// connection.
    pub fn deliver(&self, event: &PushEvent) {
        self.shared.dispatch(event);
    }

    fn subscribe_listener(&self, event: String, listener: Listener) -> SubscriptionHandle {
        let id = SubscriptionId::new();
        debug!("Subscribed {id} to {event}");
        self.shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.clone())
            .or_default()
            .push((id, listener));
        SubscriptionHandle { event, id }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        self.state.send_replace(state);
    }

    // Listeners run outside the lock so they may (un)subscribe.
    fn dispatch(&self, event: &PushEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.name)
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        if listeners.is_empty() {
            debug!("No listeners for {}", event.name);
        }
        for listener in listeners {
            listener(event);
        }
    }

    fn dispatch_frame(&self, text: &str) {
        match PushEvent::from_frame(text) {
            Ok(event) => self.dispatch(&event),
            Err(e) => warn!("Skipping push frame: {e}"),
        }
    }
}

/// The connection task: handshake, read loop, bounded reconnects.
struct Connection {
    url: String,
    session: SessionContext,
    handshake_timeout: Duration,
    reconnect_delay: Duration,
    reconnect_attempts: u32,
    shared: Arc<Shared>,
}

impl Connection {
    async fn run(self, ready: oneshot::Sender<SyncResult<()>>) {
        let mut ready = Some(ready);
        let mut attempt = 0u32;
        let mut session = self.session.watch();

        loop {
            let current = session.borrow_and_update().as_ref().map(|s| s.token.clone());
            let Some(token) = current else {
                warn!("Session ended, push channel stopping");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(SyncError::MissingCredential));
                }
                break;
            };

            match open(&self.url, &token, self.handshake_timeout).await {
                Ok(ws) => {
                    attempt = 0;
                    self.shared.set_state(ChannelState::Connected);
                    info!("Push channel connected to {}", self.url);
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Ok(()));
                    }
                    match self.read_until_dropped(ws, &token, &mut session).await {
                        Dropped::SessionEnded => {
                            info!("Session ended, push channel closed");
                            break;
                        }
                        Dropped::TokenChanged => {
                            debug!("Session token changed, reconnecting");
                            self.shared.set_state(ChannelState::Connecting);
                            continue;
                        }
                        Dropped::Connection => warn!("Push channel dropped"),
                    }
                }
                Err(e) => {
                    if let Some(tx) = ready.take() {
                        warn!("Push channel handshake failed: {e}");
                        self.shared.set_state(ChannelState::Disconnected);
                        let _ = tx.send(Err(e));
                        return;
                    }
                    warn!("Push reconnect attempt {attempt} failed: {e}");
                }
            }

            if attempt >= self.reconnect_attempts {
                warn!("Push channel giving up after {attempt} reconnect attempts");
                break;
            }
            attempt += 1;
            self.shared.set_state(ChannelState::Connecting);
            tokio::time::sleep(self.reconnect_delay).await;
        }

        self.shared.set_state(ChannelState::Disconnected);
    }

    async fn read_until_dropped(
        &self,
        mut ws: WsStream,
        token: &str,
        session: &mut watch::Receiver<Option<Session>>,
    ) -> Dropped {
        loop {
            tokio::select! {
                changed = session.changed() => {
                    let dropped = match changed {
                        Err(_) => Some(Dropped::SessionEnded),
                        Ok(()) => match session.borrow_and_update().as_ref() {
                            None => Some(Dropped::SessionEnded),
                            Some(current) if current.token != token => Some(Dropped::TokenChanged),
                            Some(_) => None,
                        },
                    };
                    if let Some(dropped) = dropped {
                        let _ = ws.close(None).await;
                        return dropped;
                    }
                }
                message = ws.next() => match message {
                    Some(Ok(Message::Text(text))) => self.shared.dispatch_frame(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.shared.dispatch_frame(&text),
                        Err(_) => warn!("Skipping non-UTF-8 binary push frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if ws.send(Message::Pong(data)).await.is_err() {
                            return Dropped::Connection;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Dropped::Connection,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Push read error: {e}");
                        return Dropped::Connection;
                    }
                },
            }
        }
    }
}

/// Why a connected socket stopped being read.
enum Dropped {
    Connection,
    SessionEnded,
    TokenChanged,
}

async fn open(url: &str, token: &str, handshake_timeout: Duration) -> SyncResult<WsStream> {
    let mut request = url
        .into_client_request()
        .map_err(|e| SyncError::Protocol(format!("invalid push URL {url}: {e}")))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| SyncError::Protocol(format!("invalid token: {e}")))?;
    request.headers_mut().insert(header::AUTHORIZATION, bearer);

    let handshake = tokio::time::timeout(handshake_timeout, tokio_tungstenite::connect_async(request));
    let Ok(result) = handshake.await else {
        return Err(SyncError::NetworkUnavailable("push handshake timed out".to_string()));
    };
    match result {
        Ok((ws, _response)) => Ok(ws),
        Err(tungstenite::Error::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
            Err(SyncError::Unauthorized)
        }
        Err(tungstenite::Error::Http(response)) => Err(SyncError::ServerRejected {
            status: response.status().as_u16(),
            message: "push handshake rejected".to_string(),
        }),
        Err(e) => Err(SyncError::NetworkUnavailable(e.to_string())),
    }
}
