//! Request/response transport.
//!
//! [`Transport`] is the seam between the sync layer and the backend's REST
//! API. Every successful response is normalized into a [`Payload`]; every
//! failure is one of three shapes callers can tell apart:
//!
//! - [`SyncError::NetworkUnavailable`]: no response at all (no status).
//! - [`SyncError::ServerRejected`]: the server answered with a failure.
//! - [`SyncError::Unauthorized`]: 401, after the session has been cleared.

use crate::config::ConsoleConfig;
use crate::error::{SyncError, SyncResult};
use crate::session::SessionContext;
use async_trait::async_trait;
use modboard_types::Payload;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Authenticated request/response calls against the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends an authenticated request.
    ///
    /// Fails with [`SyncError::Unauthorized`] without touching the network if
    /// the session holds no credential.
    async fn request(&self, method: Method, path: &str, body: Option<Value>)
    -> SyncResult<Payload>;

    /// Sends a request without credentials (login).
    async fn request_public(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> SyncResult<Payload>;

    /// The session this transport authenticates with.
    fn session(&self) -> &SessionContext;

    async fn get(&self, path: &str) -> SyncResult<Payload> {
        self.request(Method::Get, path, None).await
    }

    async fn patch(&self, path: &str, body: Option<Value>) -> SyncResult<Payload> {
        self.request(Method::Patch, path, body).await
    }

    async fn delete(&self, path: &str) -> SyncResult<Payload> {
        self.request(Method::Delete, path, None).await
    }
}

/// [`Transport`] over HTTP(S) with `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl HttpTransport {
    /// Creates a transport for `config.api_base_url` with the configured
    /// request timeout.
    pub fn new(config: &ConsoleConfig, session: SessionContext) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::Protocol(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> SyncResult<Payload> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{method} {url}");

        let mut request = self.client.request(method.into(), &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        let text = response.text().await.map_err(network_error)?;
        let body = decode_body(&text);

        if let Some(token) = token.filter(|_| status == reqwest::StatusCode::UNAUTHORIZED) {
            warn!("{method} {path}: 401, clearing session");
            self.session.expire(token);
            return Err(SyncError::Unauthorized);
        }

        accept(status.as_u16(), body)
    }
}

// Turns a decoded body into a payload, or a rejection carrying the body's
// `error`/`message`. A 2xx body can still reject with `success: false`.
fn accept(status: u16, body: Value) -> SyncResult<Payload> {
    let refused = body.get("success").and_then(Value::as_bool) == Some(false);
    if !(200..300).contains(&status) || refused {
        return Err(SyncError::ServerRejected {
            status,
            message: Payload::rejection_message(&body),
        });
    }
    Ok(Payload::normalize(body))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> SyncResult<Payload> {
        let Some(token) = self.session.token() else {
            debug!("{method} {path}: no session, rejected locally");
            return Err(SyncError::Unauthorized);
        };
        self.send(method, path, body, Some(&token)).await
    }

    async fn request_public(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> SyncResult<Payload> {
        self.send(method, path, body, None).await
    }

    fn session(&self) -> &SessionContext {
        &self.session
    }
}

// Anything that kept us from reading a response counts as "no connection".
fn network_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::NetworkUnavailable(format!("request timed out: {err}"))
    } else {
        SyncError::NetworkUnavailable(err.to_string())
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// A scripted transport for testing.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A request observed by [`MockTransport`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRequest {
        pub method: Method,
        pub path: String,
        pub body: Option<Value>,
        pub authenticated: bool,
    }

    /// Replays queued responses in order and records every request.
    ///
    /// With nothing queued, requests succeed with an empty payload.
    /// Authenticated requests honour the session like [`HttpTransport`].
    #[derive(Default)]
    pub struct MockTransport {
        session: SessionContext,
        responses: Mutex<VecDeque<SyncResult<Value>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockTransport {
        pub fn new(session: SessionContext) -> Self {
            Self {
                session,
                ..Default::default()
            }
        }

        /// Queues a successful response body (normalized on delivery).
        pub fn respond(&self, body: Value) {
            self.lock_responses().push_back(Ok(body));
        }

        /// Queues a failure.
        pub fn fail(&self, err: SyncError) {
            self.lock_responses().push_back(Err(err));
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }

        fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<SyncResult<Value>>> {
            self.responses
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        fn next(
            &self,
            method: Method,
            path: &str,
            body: Option<Value>,
            authenticated: bool,
        ) -> SyncResult<Payload> {
            self.requests
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(RecordedRequest {
                    method,
                    path: path.to_string(),
                    body,
                    authenticated,
                });
            match self.lock_responses().pop_front() {
                Some(Ok(body)) => accept(200, body),
                Some(Err(SyncError::Unauthorized)) => {
                    self.session.destroy();
                    Err(SyncError::Unauthorized)
                }
                Some(Err(e)) => Err(e),
                None => Ok(Payload::from_data(Value::Null)),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn request(
            &self,
            method: Method,
            path: &str,
            body: Option<Value>,
        ) -> SyncResult<Payload> {
            if self.session.token().is_none() {
                return Err(SyncError::Unauthorized);
            }
            self.next(method, path, body, true)
        }

        async fn request_public(
            &self,
            method: Method,
            path: &str,
            body: Option<Value>,
        ) -> SyncResult<Payload> {
            self.next(method, path, body, false)
        }

        fn session(&self) -> &SessionContext {
            &self.session
        }
    }
}
