//! Push events delivered over the real-time channel.
//!
//! Events are named `{topic}:{kind}` (`post:updated`, `report:resolved`) plus
//! the aggregate `stats:updated` and `analytics:updated`. The payload is
//! whatever JSON the server attached.

use crate::{EntityKind, EventKind, RecordId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Aggregate event carrying a fresh dashboard statistics snapshot.
pub const STATS_UPDATED: &str = "stats:updated";

/// Aggregate event carrying a fresh analytics snapshot.
pub const ANALYTICS_UPDATED: &str = "analytics:updated";

/// A named event received from the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Event name, e.g. `post:new`.
    #[serde(rename = "event")]
    pub name: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl PushEvent {
    #[must_use]
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Builds the event an entity kind emits for a change.
    #[must_use]
    pub fn for_entity(kind: EntityKind, event: EventKind, data: Value) -> Self {
        Self::new(kind.event_name(event), data)
    }

    /// Decodes a text frame.
    ///
    /// Two layouts are accepted: an object `{"event": name, "data": payload}`
    /// and a socket.io style array `[name, payload]`.
    pub fn from_frame(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            Value::Array(mut items) if !items.is_empty() => {
                let data = if items.len() > 1 { items.remove(1) } else { Value::Null };
                match items.swap_remove(0) {
                    Value::String(name) => Ok(Self { name, data }),
                    _ => Err(crate::Error::MalformedFrame(text.to_string())),
                }
            }
            _ => Err(crate::Error::MalformedFrame(text.to_string())),
        }
    }

    /// Encodes the event as an object frame.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Splits the name into topic and event kind.
    #[must_use]
    pub fn split_name(&self) -> Option<(&str, EventKind)> {
        let (topic, kind) = self.name.split_once(':')?;
        let kind = match kind {
            "new" => EventKind::New,
            "updated" => EventKind::Updated,
            "deleted" => EventKind::Deleted,
            "resolved" => EventKind::Resolved,
            _ => return None,
        };
        Some((topic, kind))
    }

    /// Identifier a deletion event refers to.
    ///
    /// Servers send either the type-specific field (`postId`) or a plain
    /// `id`, and occasionally the bare identifier as the whole payload.
    #[must_use]
    pub fn target_id(&self, kind: EntityKind) -> Option<RecordId> {
        match &self.data {
            Value::Object(fields) => fields
                .get(kind.id_field())
                .and_then(RecordId::from_json)
                .or_else(|| fields.get("id").and_then(RecordId::from_json)),
            other => RecordId::from_json(other),
        }
    }
}
