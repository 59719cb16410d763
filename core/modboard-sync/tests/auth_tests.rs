use modboard_sync::transport::mock::MockTransport;
use modboard_sync::{
    ConsoleConfig, HttpTransport, INVALID_CREDENTIALS, LoginMode, Method, PushChannel,
    SessionContext, SyncError, Transport, login, logout,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> ConsoleConfig {
    ConsoleConfig::default()
}

// ── Login ────────────────────────────────────────────────────────

#[tokio::test]
async fn server_login_stores_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/admin/login"))
        .and(body_json(json!({"username": "mod", "password": "pw"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "data": {"token": "srv-token"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = ConsoleConfig {
        api_base_url: format!("{}/api", server.uri()),
        ..config()
    };
    let session = SessionContext::new();
    let transport = HttpTransport::new(&config, session.clone()).unwrap();

    assert_eq!(login(&transport, &config, "mod", "pw").await.unwrap(), LoginMode::Server);
    assert_eq!(session.token().as_deref(), Some("srv-token"));
}

#[tokio::test]
async fn response_without_token_is_a_protocol_error() {
    let transport = MockTransport::new(SessionContext::new());
    transport.respond(json!({"success": true, "data": {"user": "mod"}}));

    let err = login(&transport, &config(), "mod", "pw").await.unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)), "got {err:?}");
    assert!(!transport.session().is_authenticated());
}

#[tokio::test]
async fn demo_credentials_work_offline() {
    let transport = MockTransport::new(SessionContext::new());
    transport.fail(SyncError::NetworkUnavailable("connection refused".into()));

    let mode = login(&transport, &config(), "admin", "admin123").await.unwrap();
    assert_eq!(mode, LoginMode::Demo);

    let token = transport.session().token().unwrap();
    let millis = token.strip_prefix("demo_token_").unwrap();
    assert!(millis.parse::<i64>().is_ok(), "{token}");
    assert!(!transport.requests()[0].authenticated);
}

#[tokio::test]
async fn other_credentials_fail_offline() {
    let transport = MockTransport::new(SessionContext::new());
    transport.fail(SyncError::NetworkUnavailable("connection refused".into()));

    match login(&transport, &config(), "admin", "wrong").await.unwrap_err() {
        SyncError::InvalidCredentials(message) => assert_eq!(message, INVALID_CREDENTIALS),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!transport.session().is_authenticated());
}

#[tokio::test]
async fn rejection_message_is_surfaced() {
    let transport = MockTransport::new(SessionContext::new());
    transport.fail(SyncError::ServerRejected {
        status: 401,
        message: "Account locked".into(),
    });

    let err = login(&transport, &config(), "admin", "admin123").await.unwrap_err();
    assert!(err.is_user_visible());
    match err {
        SyncError::InvalidCredentials(message) => assert_eq!(message, "Account locked"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn generic_rejection_reads_invalid_credentials() {
    let transport = MockTransport::new(SessionContext::new());
    transport.fail(SyncError::ServerRejected {
        status: 400,
        message: "Request failed".into(),
    });

    match login(&transport, &config(), "a", "b").await.unwrap_err() {
        SyncError::InvalidCredentials(message) => assert_eq!(message, INVALID_CREDENTIALS),
        other => panic!("unexpected error: {other:?}"),
    }
}

// ── Logout ───────────────────────────────────────────────────────

#[tokio::test]
async fn logout_clears_session_and_listeners() {
    let session = SessionContext::new();
    session.create("tok").unwrap();
    let transport = MockTransport::new(session.clone());
    let push = PushChannel::new(&config(), session.clone());
    push.subscribe("post:new", |_| {});

    logout(&transport, &push).await;

    assert!(!session.is_authenticated());
    assert_eq!(push.listener_count("post:new"), 0);
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].path, "/admin/logout");
}

#[tokio::test]
async fn logout_survives_server_failure() {
    let session = SessionContext::new();
    session.create("tok").unwrap();
    let transport = MockTransport::new(session.clone());
    transport.fail(SyncError::NetworkUnavailable("offline".into()));
    let push = PushChannel::new(&config(), session.clone());

    logout(&transport, &push).await;
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn logout_when_logged_out_skips_server() {
    let transport = MockTransport::new(SessionContext::new());
    let push = PushChannel::new(&config(), SessionContext::new());

    logout(&transport, &push).await;
    assert!(transport.requests().is_empty());
}
