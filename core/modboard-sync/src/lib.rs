//! Real-time entity sync for the Modboard admin console.
//!
//! Keeps each console screen's record list consistent between three
//! sources: the initial bulk fetch, local moderation actions applied on
//! success, and push notifications about changes made elsewhere.
//!
//! # Components
//!
//! - **Session**: the bearer credential, shared by transport and push channel
//! - **Transport**: authenticated request/response calls with a normalized
//!   result
//! - **Push channel**: one WebSocket per session with bounded reconnects and
//!   handle-based listener registration
//! - **Reconciler**: folds fetch results, push events and local mutations
//!   into a screen's store in a fixed order
//! - **Bindings**: tie a rendered screen to its store while it is mounted
//!
//! # Example
//!
//! ```no_run
//! use modboard_sync::{ConsoleConfig, HttpTransport, NullRenderer, PushChannel, ScreenBinding, SessionContext};
//! use modboard_types::EntityKind;
//! use std::sync::Arc;
//!
//! # async fn run() -> modboard_sync::SyncResult<()> {
//! let config = ConsoleConfig::from_env();
//! let session = SessionContext::new();
//! let transport = Arc::new(HttpTransport::new(&config, session.clone())?);
//! let push = Arc::new(PushChannel::new(&config, session));
//!
//! modboard_sync::login(transport.as_ref(), &config, "admin", "admin123").await?;
//! push.connect().await?;
//!
//! let posts = ScreenBinding::mount(EntityKind::Posts, transport, push, Arc::new(NullRenderer));
//! let snapshot = posts.wait_for(|s| s.seeded).await?;
//! println!("{} posts", snapshot.records.len());
//! # Ok(())
//! # }
//! ```

pub mod actions;
mod auth;
pub mod binding;
mod config;
mod error;
pub mod push;
pub mod reconciler;
pub mod session;
pub mod transport;

pub use actions::{ADMIN_OWNER, Action};
pub use auth::{INVALID_CREDENTIALS, LoginMode, login, logout};
pub use binding::{
    AggregateBinding, AggregateSnapshot, NullRenderer, Renderer, ScreenBinding, ScreenSnapshot,
};
pub use config::{ConsoleConfig, ENV_API_BASE_URL, ENV_PUSH_URL};
pub use error::{SyncError, SyncResult};
pub use push::{
    ChannelState, EntityCallbacks, EntitySubscription, Listener, PushChannel, SubscriptionHandle,
};
pub use reconciler::{LocalMutation, Reconciler, SyncInput};
pub use session::{Session, SessionContext, SessionFile, StoredSession};
pub use transport::{HttpTransport, Method, Transport};
