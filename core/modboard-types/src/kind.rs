//! Entity kinds managed by the console and the push events they emit.

use crate::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An entity type the console manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Users,
    Posts,
    Communities,
    Events,
    Locations,
    Advertising,
    Reports,
    Verification,
    Business,
}

impl EntityKind {
    /// Every kind, in sidebar order.
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Users,
        EntityKind::Verification,
        EntityKind::Business,
        EntityKind::Posts,
        EntityKind::Communities,
        EntityKind::Events,
        EntityKind::Locations,
        EntityKind::Advertising,
        EntityKind::Reports,
    ];

    /// REST collection path, relative to the API base URL.
    #[must_use]
    pub const fn collection_path(&self) -> &'static str {
        match self {
            Self::Users => "/admin/users",
            Self::Posts => "/admin/posts",
            Self::Communities => "/admin/communities",
            Self::Events => "/admin/events",
            Self::Locations => "/admin/locations",
            Self::Advertising => "/admin/advertising",
            Self::Reports => "/admin/reports",
            Self::Verification => "/admin/verification",
            Self::Business => "/admin/business",
        }
    }

    /// Path of a single record.
    #[must_use]
    pub fn item_path(&self, id: &crate::RecordId) -> String {
        format!("{}/{}", self.collection_path(), id)
    }

    /// Singular topic used to build push event names (`post` in `post:new`).
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::Users => "user",
            Self::Posts => "post",
            Self::Communities => "community",
            Self::Events => "event",
            Self::Locations => "location",
            Self::Advertising => "advertising",
            Self::Reports => "report",
            Self::Verification => "verification",
            Self::Business => "business",
        }
    }

    /// Key a list response may nest its array under (`{"posts": [...]}`).
    #[must_use]
    pub const fn list_key(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Posts => "posts",
            Self::Communities => "communities",
            Self::Events => "events",
            Self::Locations => "locations",
            Self::Advertising => "advertising",
            Self::Reports => "reports",
            Self::Verification => "verification",
            Self::Business => "business",
        }
    }

    /// Type-specific identifier field carried by deletion events (`postId`).
    #[must_use]
    pub const fn id_field(&self) -> &'static str {
        match self {
            Self::Users => "userId",
            Self::Posts => "postId",
            Self::Communities => "communityId",
            Self::Events => "eventId",
            Self::Locations => "locationId",
            Self::Advertising => "advertisingId",
            Self::Reports => "reportId",
            Self::Verification => "verificationId",
            Self::Business => "businessId",
        }
    }

    /// Push event kinds this entity emits.
    #[must_use]
    pub fn event_kinds(&self) -> &'static [EventKind] {
        match self {
            Self::Reports => &[EventKind::New, EventKind::Resolved, EventKind::Deleted],
            _ => &[EventKind::New, EventKind::Updated, EventKind::Deleted],
        }
    }

    /// Full push event name for one of this entity's event kinds.
    #[must_use]
    pub fn event_name(&self, kind: EventKind) -> String {
        format!("{}:{}", self.topic(), kind.as_str())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.list_key())
    }
}

impl FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.list_key() == lowered || k.topic() == lowered)
            .or_else(|| (lowered == "verification-requests").then_some(Self::Verification))
            .ok_or(crate::Error::UnknownKind(s.to_string()))
    }
}

/// The change a push event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    New,
    Updated,
    Deleted,
    /// Reports only: a moderator resolved the report elsewhere.
    Resolved,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tab of the reports screen a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportCategory {
    Posts,
    Communities,
    Users,
}

impl ReportCategory {
    /// Classifies a report by its `type` field. Backends use both singular
    /// and plural spellings.
    #[must_use]
    pub fn of(report: &Record) -> Option<Self> {
        match report.get_str("type")? {
            "post" | "posts" => Some(Self::Posts),
            "community" | "communities" => Some(Self::Communities),
            "user" | "users" => Some(Self::Users),
            _ => None,
        }
    }
}
