//! Response envelope normalization.
//!
//! The backend usually wraps responses as
//! `{ data, success, message?, error?, pagination? }`, but some endpoints
//! return a raw array or a raw object. Everything is folded into one
//! [`Payload`] shape before it reaches a store.

use crate::{EntityKind, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fallback message when a rejected response carries no explanation.
pub const GENERIC_REJECTION: &str = "Request failed";

/// Pagination block attached to list responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// A normalized successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub data: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Records pulled out of a payload, with a count of elements that could not
/// be read as records (missing `id`, not an object).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRecords {
    pub records: Vec<Record>,
    pub skipped: usize,
}

impl Payload {
    /// Normalizes a decoded response body.
    #[must_use]
    pub fn normalize(body: Value) -> Self {
        match body {
            Value::Object(mut obj) => {
                let success = obj.get("success").and_then(Value::as_bool) != Some(false);
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let pagination = obj
                    .get("pagination")
                    .cloned()
                    .and_then(|p| serde_json::from_value(p).ok());
                let data = match obj.remove("data") {
                    Some(inner) if !inner.is_null() => inner,
                    Some(_) | None if is_envelope(&obj) => Value::Null,
                    _ => Value::Object(obj),
                };
                Self {
                    data,
                    success,
                    message,
                    pagination,
                }
            }
            other => Self::from_data(other),
        }
    }

    /// Wraps bare data as a successful payload.
    #[must_use]
    pub fn from_data(data: Value) -> Self {
        Self {
            data,
            success: true,
            message: None,
            pagination: None,
        }
    }

    /// Extracts the record list for an entity kind.
    ///
    /// `data` may be the array itself or an object nesting it under the
    /// kind's list key (`{"posts": [...]}`). Anything else yields no records.
    #[must_use]
    pub fn records(&self, kind: EntityKind) -> ExtractedRecords {
        let items = match &self.data {
            Value::Array(items) => items.as_slice(),
            Value::Object(obj) => match obj.get(kind.list_key()) {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        };

        let mut out = ExtractedRecords::default();
        for item in items {
            match Record::from_json(item.clone()) {
                Ok(record) => out.records.push(record),
                Err(_) => out.skipped += 1,
            }
        }
        out
    }

    /// Reads `data` as a single record, if it is one.
    #[must_use]
    pub fn record(&self) -> Option<Record> {
        Record::from_json(self.data.clone()).ok()
    }

    /// Message to show for a rejected response body: `error`, then
    /// `message`, then a generic fallback.
    #[must_use]
    pub fn rejection_message(body: &Value) -> String {
        body.get("error")
            .and_then(Value::as_str)
            .or_else(|| body.get("message").and_then(Value::as_str))
            .filter(|m| !m.is_empty())
            .unwrap_or(GENERIC_REJECTION)
            .to_string()
    }
}

// A body whose `data` was null/absent is still an envelope if it only
// carries envelope bookkeeping keys.
fn is_envelope(obj: &serde_json::Map<String, Value>) -> bool {
    !obj.is_empty()
        && obj
            .keys()
            .all(|k| matches!(k.as_str(), "success" | "message" | "error" | "pagination"))
}
