//! Core type definitions for Modboard.
//!
//! This crate defines the entity-agnostic types shared by the store, the
//! sync layer and the console binary:
//! - Record identifiers and subscription handles
//! - Records (entity instances kept as JSON objects)
//! - Entity kinds with their REST paths and push-event naming
//! - Push events, the response envelope and list queries
//!
//! Per-page field layouts (what a post or a report looks like on screen)
//! are not modelled here.

mod envelope;
mod event;
mod ids;
mod kind;
mod query;
mod record;
mod stats;

pub use envelope::{ExtractedRecords, GENERIC_REJECTION, Pagination, Payload};
pub use event::{ANALYTICS_UPDATED, PushEvent, STATS_UPDATED};
pub use ids::{RecordId, SubscriptionId};
pub use kind::{EntityKind, EventKind, ReportCategory};
pub use query::ListQuery;
pub use record::Record;
pub use stats::{AnalyticsPanel, DashboardStats, TimeRange};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record has no usable `id` field")]
    MissingId,

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("malformed push frame: {0}")]
    MalformedFrame(String),
}
