//! Login and logout.

use crate::config::ConsoleConfig;
use crate::error::{SyncError, SyncResult};
use crate::push::PushChannel;
use crate::transport::{Method, Transport};
use serde_json::json;
use tracing::{debug, info, warn};

/// Message shown when the server rejects a login without explaining why.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// How a session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    /// The backend issued the token.
    Server,
    /// The backend was unreachable and the offline demo pair was accepted.
    Demo,
}

/// Logs in and stores the resulting token in the transport's session.
///
/// If the backend cannot be reached, the configured demo credentials are
/// accepted and a synthetic `demo_token_<unix millis>` is issued instead.
pub async fn login(
    transport: &dyn Transport,
    config: &ConsoleConfig,
    username: &str,
    password: &str,
) -> SyncResult<LoginMode> {
    let body = json!({ "username": username, "password": password });
    match transport
        .request_public(Method::Post, "/admin/login", Some(body))
        .await
    {
        Ok(payload) => {
            let token = payload
                .data
                .get("token")
                .and_then(|t| t.as_str())
                .filter(|t| !t.is_empty())
                .ok_or_else(|| SyncError::Protocol("login response carried no token".into()))?;
            transport.session().create(token)?;
            info!("Logged in as {username}");
            Ok(LoginMode::Server)
        }
        Err(SyncError::NetworkUnavailable(reason)) => {
            debug!("Backend unreachable during login: {reason}");
            if username == config.demo_username && password == config.demo_password {
                let token = format!("demo_token_{}", chrono::Utc::now().timestamp_millis());
                transport.session().create(token)?;
                warn!("Backend unreachable, logged in with demo credentials");
                Ok(LoginMode::Demo)
            } else {
                Err(SyncError::InvalidCredentials(INVALID_CREDENTIALS.to_string()))
            }
        }
        Err(SyncError::ServerRejected { message, .. }) => {
            let message = if message.is_empty() || message == modboard_types::GENERIC_REJECTION {
                INVALID_CREDENTIALS.to_string()
            } else {
                message
            };
            Err(SyncError::InvalidCredentials(message))
        }
        Err(e) => Err(e),
    }
}

/// Ends the session: best-effort server logout, then local teardown.
pub async fn logout(transport: &dyn Transport, push: &PushChannel) {
    if transport.session().is_authenticated() {
        if let Err(e) = transport.request(Method::Post, "/admin/logout", None).await {
            debug!("Server logout failed (ignored): {e}");
        }
    }
    transport.session().destroy();
    push.disconnect();
    info!("Logged out");
}
