use futures::{SinkExt, StreamExt};
use modboard_sync::{ChannelState, ConsoleConfig, EntityCallbacks, PushChannel, SessionContext, SyncError};
use modboard_types::{EntityKind, PushEvent};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

const WAIT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

/// A local WebSocket server handing each accepted connection (with the
/// Authorization header it presented) to the test.
struct TestServer {
    url: String,
    connections: mpsc::UnboundedReceiver<(Option<String>, ServerSocket)>,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(false).await
    }

    async fn start_rejecting() -> Self {
        Self::start_with(true).await
    }

    async fn start_with(reject: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, connections) = mpsc::unbounded_channel();

        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut auth = None;
                    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        auth = req
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        if reject {
                            let denied = http::Response::builder()
                                .status(http::StatusCode::UNAUTHORIZED)
                                .body(None)
                                .unwrap();
                            return Err(denied);
                        }
                        Ok(resp)
                    };
                    if let Ok(ws) = accept_hdr_async(stream, callback).await {
                        let _ = tx.send((auth, ws));
                    }
                });
            }
        });

        Self {
            url: format!("ws://{addr}/ws"),
            connections,
            accept_loop,
        }
    }

    async fn next_connection(&mut self) -> (Option<String>, ServerSocket) {
        timeout(WAIT, self.connections.recv()).await.unwrap().unwrap()
    }

    /// Stops accepting; later connection attempts are refused.
    fn stop_accepting(&self) {
        self.accept_loop.abort();
    }
}

fn channel(url: &str, session: SessionContext) -> PushChannel {
    let config = ConsoleConfig {
        push_url: url.to_string(),
        reconnect_delay_ms: 50,
        reconnect_attempts: 2,
        ..ConsoleConfig::default()
    };
    PushChannel::new(&config, session)
}

fn logged_in(token: &str) -> SessionContext {
    let session = SessionContext::new();
    session.create(token).unwrap();
    session
}

fn collector(push: &PushChannel, event: &str) -> mpsc::UnboundedReceiver<PushEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    push.subscribe(event, move |e: &PushEvent| {
        let _ = tx.send(e.clone());
    });
    rx
}

async fn wait_state(push: &PushChannel, state: ChannelState) {
    let mut rx = push.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap()
        .unwrap();
}

// ── Connect ──────────────────────────────────────────────────────

#[tokio::test]
async fn connect_without_token_is_refused() {
    let push = channel("ws://127.0.0.1:1/ws", SessionContext::new());
    assert!(matches!(push.connect().await, Err(SyncError::MissingCredential)));
    assert_eq!(push.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn connect_presents_bearer_token() {
    let mut server = TestServer::start().await;
    let push = channel(&server.url, logged_in("tok-9"));

    assert_eq!(push.connect().await.unwrap(), ChannelState::Connected);
    assert!(push.is_connected());

    let (auth, _ws) = server.next_connection().await;
    assert_eq!(auth.as_deref(), Some("Bearer tok-9"));
}

#[tokio::test]
async fn connect_is_idempotent() {
    let mut server = TestServer::start().await;
    let push = channel(&server.url, logged_in("t"));

    push.connect().await.unwrap();
    let _first = server.next_connection().await;
    assert_eq!(push.connect().await.unwrap(), ChannelState::Connected);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.connections.try_recv().is_err());
}

#[tokio::test]
async fn initial_connect_failure_is_reported() {
    let push = channel("ws://127.0.0.1:1/ws", logged_in("t"));
    let err = push.connect().await.unwrap_err();
    assert!(matches!(err, SyncError::NetworkUnavailable(_)), "got {err:?}");
    assert_eq!(push.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn rejected_handshake_is_unauthorized() {
    let server = TestServer::start_rejecting().await;
    let push = channel(&server.url, logged_in("expired"));
    assert!(matches!(push.connect().await, Err(SyncError::Unauthorized)));
    assert_eq!(push.state(), ChannelState::Disconnected);
}

// ── Delivery ─────────────────────────────────────────────────────

#[tokio::test]
async fn frames_reach_matching_listeners_in_order() {
    let mut server = TestServer::start().await;
    let push = channel(&server.url, logged_in("t"));
    let mut posts = collector(&push, "post:new");
    let mut users = collector(&push, "user:deleted");

    push.connect().await.unwrap();
    let (_, mut ws) = server.next_connection().await;

    ws.send(Message::Text(r#"{"event":"post:new","data":{"id":1}}"#.into()))
        .await
        .unwrap();
    ws.send(Message::Text("not a frame".into())).await.unwrap();
    ws.send(Message::Text(r#"["user:deleted",{"userId":"u7"}]"#.into()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"["post:new",{"id":2}]"#.into()))
        .await
        .unwrap();

    let first = timeout(WAIT, posts.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, posts.recv()).await.unwrap().unwrap();
    assert_eq!(first.data, json!({"id": 1}));
    assert_eq!(second.data, json!({"id": 2}));

    let deleted = timeout(WAIT, users.recv()).await.unwrap().unwrap();
    assert_eq!(deleted.data, json!({"userId": "u7"}));
}

#[tokio::test]
async fn unsubscribed_listener_stops_receiving() {
    let push = channel("ws://127.0.0.1:1/ws", SessionContext::new());
    let seen = Arc::new(Mutex::new(0));

    let handle = {
        let seen = seen.clone();
        push.subscribe("post:updated", move |_: &PushEvent| {
            *seen.lock().unwrap() += 1;
        })
    };
    let event = PushEvent::new("post:updated", json!({"id": 1}));

    push.deliver(&event);
    assert_eq!(*seen.lock().unwrap(), 1);

    assert!(push.unsubscribe(handle.clone()));
    push.deliver(&event);
    assert_eq!(*seen.lock().unwrap(), 1);
    assert_eq!(push.listener_count("post:updated"), 0);

    assert!(!push.unsubscribe(handle));
}

#[tokio::test]
async fn unsubscribe_removes_only_that_listener() {
    let push = channel("ws://127.0.0.1:1/ws", SessionContext::new());
    let first = push.subscribe("community:new", |_: &PushEvent| {});
    let _second = push.subscribe("community:new", |_: &PushEvent| {});
    assert_eq!(push.listener_count("community:new"), 2);

    push.unsubscribe(first);
    assert_eq!(push.listener_count("community:new"), 1);
}

#[tokio::test]
async fn entity_subscription_covers_event_kinds() {
    let push = channel("ws://127.0.0.1:1/ws", SessionContext::new());

    let reports = push.subscribe_entity(
        EntityKind::Reports,
        EntityCallbacks::default()
            .on_new(|_| {})
            .on_updated(|_| {})
            .on_deleted(|_| {})
            .on_resolved(|_| {}),
    );
    // Reports emit new/resolved/deleted; the updated callback has no event.
    assert_eq!(reports.handles().len(), 3);
    assert_eq!(push.listener_count("report:resolved"), 1);
    assert_eq!(push.listener_count("report:updated"), 0);

    let posts = push.subscribe_entity(EntityKind::Posts, EntityCallbacks::default().on_deleted(|_| {}));
    assert_eq!(posts.handles().len(), 1);
    assert_eq!(posts.handles()[0].event(), "post:deleted");

    push.unsubscribe_entity(reports);
    assert_eq!(push.listener_count("report:new"), 0);
    assert_eq!(push.listener_count("post:deleted"), 1);
}

// ── Reconnect & teardown ─────────────────────────────────────────

#[tokio::test]
async fn reconnects_after_drop() {
    let mut server = TestServer::start().await;
    let push = channel(&server.url, logged_in("t"));
    let mut posts = collector(&push, "post:new");

    push.connect().await.unwrap();
    let (_, first) = server.next_connection().await;
    drop(first);

    let (auth, mut second) = server.next_connection().await;
    assert_eq!(auth.as_deref(), Some("Bearer t"));
    wait_state(&push, ChannelState::Connected).await;

    second
        .send(Message::Text(r#"{"event":"post:new","data":{"id":3}}"#.into()))
        .await
        .unwrap();
    let event = timeout(WAIT, posts.recv()).await.unwrap().unwrap();
    assert_eq!(event.data["id"], 3);
}

#[tokio::test]
async fn gives_up_after_bounded_attempts() {
    let mut server = TestServer::start().await;
    let push = channel(&server.url, logged_in("t"));

    push.connect().await.unwrap();
    let (_, ws) = server.next_connection().await;
    server.stop_accepting();
    drop(ws);

    wait_state(&push, ChannelState::Disconnected).await;
    assert!(!push.is_connected());
}

#[tokio::test]
async fn disconnect_clears_state_and_listeners() {
    let mut server = TestServer::start().await;
    let push = channel(&server.url, logged_in("t"));
    let _rx = collector(&push, "post:new");

    push.connect().await.unwrap();
    let (_, mut ws) = server.next_connection().await;

    push.disconnect();
    assert_eq!(push.state(), ChannelState::Disconnected);
    assert_eq!(push.listener_count("post:new"), 0);

    // The server side sees the connection end.
    let end = timeout(WAIT, ws.next()).await.unwrap();
    assert!(!matches!(end, Some(Ok(Message::Text(_)))));
}

#[tokio::test]
async fn connect_after_disconnect_opens_new_connection() {
    let mut server = TestServer::start().await;
    let push = channel(&server.url, logged_in("t"));

    push.connect().await.unwrap();
    let _first = server.next_connection().await;
    push.disconnect();

    assert_eq!(push.connect().await.unwrap(), ChannelState::Connected);
    let _second = server.next_connection().await;
}

#[tokio::test]
async fn session_end_closes_the_connection() {
    let mut server = TestServer::start().await;
    let session = logged_in("t");
    let push = channel(&server.url, session.clone());

    push.connect().await.unwrap();
    let (_, mut ws) = server.next_connection().await;

    session.destroy();
    wait_state(&push, ChannelState::Disconnected).await;

    let end = timeout(WAIT, ws.next()).await.unwrap();
    assert!(!matches!(end, Some(Ok(Message::Text(_)))));
    // No reconnect with the ended session.
    assert!(timeout(Duration::from_millis(200), server.connections.recv()).await.is_err());
}

#[tokio::test]
async fn new_token_reconnects_with_it() {
    let mut server = TestServer::start().await;
    let session = logged_in("first");
    let push = channel(&server.url, session.clone());

    push.connect().await.unwrap();
    let (auth, _first) = server.next_connection().await;
    assert_eq!(auth.as_deref(), Some("Bearer first"));

    session.create("second").unwrap();
    let (auth, _second) = server.next_connection().await;
    assert_eq!(auth.as_deref(), Some("Bearer second"));
    wait_state(&push, ChannelState::Connected).await;
}
