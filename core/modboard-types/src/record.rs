//! Records: entity instances as delivered by the backend.
//!
//! Field shapes differ per entity type, so a record keeps its full JSON
//! object and only interprets the few fields the sync layer relies on:
//! the identifier, the status/lifecycle field and the creation timestamp.

use crate::{Error, RecordId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// An entity instance (user, post, community, event, report, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    fields: Map<String, Value>,
}

impl Record {
    /// Builds a record from a JSON object carrying an `id` field.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Self::from_fields(fields),
            _ => Err(Error::NotAnObject),
        }
    }

    /// Builds a record from an already-split JSON object.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        let id = fields
            .get("id")
            .and_then(RecordId::from_json)
            .ok_or(Error::MissingId)?;
        Ok(Self { id, fields })
    }

    /// Creates a record with the given id and no other fields.
    #[must_use]
    pub fn with_id(id: impl Into<RecordId>) -> Self {
        let id = id.into();
        let mut fields = Map::new();
        fields.insert("id".to_string(), id.to_json());
        Self { id, fields }
    }

    /// Builder-style field setter. Setting `id` is ignored.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    #[must_use]
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// The lifecycle field (`status`), falling back to `accountStatus` which
    /// user records use.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.get_str("status").or_else(|| self.get_str("accountStatus"))
    }

    /// Creation time, read from `createdAt` or `created_at`.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.get_str("createdAt").or_else(|| self.get_str("created_at"))?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Sets a field. The identifier is immutable, so `id` is ignored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        if name == "id" {
            return;
        }
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn set_status(&mut self, status: &str) {
        self.set("status", status);
    }

    /// Merges the top-level fields of `patch` into this record. A differing
    /// `id` in the patch is ignored.
    pub fn merge(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            if key != "id" {
                self.fields.insert(key.clone(), value.clone());
            }
        }
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    #[must_use]
    pub fn into_json(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let fields = Map::deserialize(deserializer)?;
        Record::from_fields(fields).map_err(serde::de::Error::custom)
    }
}
