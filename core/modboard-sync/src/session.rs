//! Session credential.
//!
//! A [`SessionContext`] holds the bearer token for one console process. It is
//! created at login, destroyed at logout or when the backend answers 401, and
//! handed to the transport and the push channel at construction. Clones share
//! the same session, and [`SessionContext::watch`] lets long-running tasks
//! stop when it ends.
//!
//! When backed by a [`SessionFile`], every change is persisted as the two
//! flags `authenticated` and `token`, so a later process can resume.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Shared handle to the current session, if any.
#[derive(Debug, Clone)]
pub struct SessionContext {
    current: Arc<watch::Sender<Option<Session>>>,
    file: Option<Arc<SessionFile>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            current: Arc::new(watch::Sender::new(None)),
            file: None,
        }
    }
}

impl SessionContext {
    /// A context with no session and no persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context persisted to `file`, resuming the stored session if the
    /// stored flags allow it.
    pub fn restore(file: SessionFile) -> SyncResult<Self> {
        let stored = file.load()?;
        let session = stored.token().map(|token| Session {
            token: token.to_string(),
            created_at: Utc::now(),
        });
        if session.is_some() {
            debug!("Resumed session from {}", file.path().display());
        }
        Ok(Self {
            current: Arc::new(watch::Sender::new(session)),
            file: Some(Arc::new(file)),
        })
    }

    /// Starts a session with `token`, replacing any previous one.
    pub fn create(&self, token: impl Into<String>) -> SyncResult<()> {
        let session = Session {
            token: token.into(),
            created_at: Utc::now(),
        };
        if let Some(file) = &self.file {
            file.save(&StoredSession::signed_in(&session.token))?;
        }
        self.current.send_replace(Some(session));
        info!("Session created");
        Ok(())
    }

    /// Ends the session. Safe to call when no session exists.
    pub fn destroy(&self) {
        let previous = self.current.send_replace(None);
        self.clear_file();
        if previous.is_some() {
            info!("Session destroyed");
        }
    }

    /// Ends the session only if it still holds `token`. Returns whether it
    /// did; a session created since `token` was read is left alone.
    pub fn expire(&self, token: &str) -> bool {
        let expired = self.current.send_if_modified(|current| {
            if current.as_ref().is_some_and(|s| s.token == token) {
                *current = None;
                true
            } else {
                false
            }
        });
        if expired {
            self.clear_file();
            info!("Session expired");
        } else {
            debug!("Stale 401 ignored, session already replaced");
        }
        expired
    }

    /// Receiver that observes every session change.
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }

    fn clear_file(&self) {
        if let Some(file) = &self.file {
            if let Err(e) = file.clear() {
                warn!("Failed to clear session file {}: {e}", file.path().display());
            }
        }
    }

    /// The bearer token, if a session exists.
    pub fn token(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }
}

/// The persisted session flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredSession {
    pub authenticated: bool,
    pub token: Option<String>,
}

impl StoredSession {
    pub fn signed_in(token: &str) -> Self {
        Self {
            authenticated: true,
            token: Some(token.to_string()),
        }
    }

    /// The token, only if the protected UI may be shown: the flag is set
    /// and a non-empty token is present.
    pub fn token(&self) -> Option<&str> {
        match (&self.token, self.authenticated) {
            (Some(token), true) if !token.is_empty() => Some(token),
            _ => None,
        }
    }

    pub fn allows_protected(&self) -> bool {
        self.token().is_some()
    }
}

/// JSON file holding a [`StoredSession`].
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored flags. A missing file reads as logged out.
    pub fn load(&self) -> SyncResult<StoredSession> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredSession::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, stored: &StoredSession) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(stored)?)?;
        Ok(())
    }

    /// Writes the logged-out flags.
    pub fn clear(&self) -> SyncResult<()> {
        self.save(&StoredSession::default())
    }
}
