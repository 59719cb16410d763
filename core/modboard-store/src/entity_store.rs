//! Ordered, id-unique record collection for one entity kind.

use indexmap::IndexMap;
use modboard_types::{EntityKind, Record, RecordId};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tracing::debug;

/// Records of one entity kind, in display order.
#[derive(Debug, Clone)]
pub struct EntityStore {
    kind: EntityKind,
    records: IndexMap<RecordId, Record>,
}

impl EntityStore {
    /// Creates an empty store.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            records: IndexMap::new(),
        }
    }

    /// The entity kind this store holds.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    // ── Core operations ──────────────────────────────────────────

    /// Discards the current contents and installs `records` in the given
    /// order. A later record with an already-seen id replaces the earlier
    /// one at the earlier position.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.clear();
        for record in records {
            self.records.insert(record.id().clone(), record);
        }
        debug!("{}: replaced contents with {} records", self.kind, self.records.len());
    }

    /// Inserts or replaces a record.
    ///
    /// An existing id is replaced in place. A new id is inserted at the front.
    /// Returns `true` if the record was new.
    pub fn upsert(&mut self, record: Record) -> bool {
        if let Some(existing) = self.records.get_mut(record.id()) {
            *existing = record;
            false
        } else {
            self.records.shift_insert(0, record.id().clone(), record);
            true
        }
    }

    /// Removes a record. Returns `false` if the id was not present.
    pub fn remove(&mut self, id: &RecordId) -> bool {
        self.records.shift_remove(id).is_some()
    }

    /// Current records in order, cloned.
    pub fn read(&self) -> Vec<Record> {
        self.records.values().cloned().collect()
    }

    // ── Lookups ──────────────────────────────────────────────────

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids in order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.keys().cloned().collect()
    }

    // ── Field-level updates ──────────────────────────────────────

    /// Merges `fields` into an existing record, keeping its position.
    /// Returns `false` (and changes nothing) if the id is absent.
    pub fn patch(&mut self, id: &RecordId, fields: &Map<String, Value>) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.merge(fields);
                true
            }
            None => false,
        }
    }

    // ── Ordering ─────────────────────────────────────────────────

    /// Reorders records by creation time, newest first. Records without a
    /// readable timestamp sink to the end; ties keep their relative order.
    pub fn sort_newest_first(&mut self) {
        self.records
            .sort_by(|_, a, _, b| b.created_at().cmp(&a.created_at()));
    }

    /// Reorders records with a caller-supplied comparison (stable).
    pub fn sort_by<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&Record, &Record) -> Ordering,
    {
        self.records.sort_by(|_, a, _, b| cmp(a, b));
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Records where any of `fields` contains `term`, ignoring case.
    ///
    /// String and numeric field values are searched. An empty or
    /// whitespace-only term matches every record.
    pub fn search(&self, term: &str, fields: &[&str]) -> Vec<&Record> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.records.values().collect();
        }
        self.records
            .values()
            .filter(|record| {
                fields.iter().any(|field| match record.get(field) {
                    Some(Value::String(s)) => s.to_lowercase().contains(&needle),
                    Some(Value::Number(n)) => n.to_string().contains(&needle),
                    _ => false,
                })
            })
            .collect()
    }

    /// Number of records whose status equals `status`.
    pub fn count_by_status(&self, status: &str) -> usize {
        self.records
            .values()
            .filter(|r| r.status() == Some(status))
            .count()
    }
}
