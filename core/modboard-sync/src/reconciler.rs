//! Reconciler: stateful store-update policy without I/O.
//!
//! The reconciler owns one screen's [`EntityStore`] and folds every input
//! into it: the bulk fetch result, push events and local mutations that a
//! successful action produced. The screen binding handles all I/O and feeds
//! inputs in arrival order.
//!
//! # Ordering
//!
//! Until the first fetch lands the store is unseeded. Push events and local
//! mutations received in that window are buffered and replayed, in arrival
//! order, right after the fetch result is installed. A failed fetch seeds
//! an empty store and replays the buffer the same way, so nothing is lost.

use modboard_store::EntityStore;
use modboard_types::{EntityKind, EventKind, PushEvent, Record, RecordId, ReportCategory};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Status a report takes when resolved.
pub const REVIEWED: &str = "reviewed";

/// One input to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncInput {
    /// The bulk fetch succeeded.
    FetchCompleted(Vec<Record>),
    /// The bulk fetch failed.
    FetchFailed(String),
    /// A push event arrived.
    Push(PushEvent),
    /// A local action succeeded on the server.
    Local(LocalMutation),
}

/// Store change produced by a successful local action.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalMutation {
    Upsert(Record),
    Remove(RecordId),
    /// Merge fields into an existing record.
    Patch(RecordId, Map<String, Value>),
    /// Mark a report reviewed, recording the action its category implies.
    ResolveReport(RecordId),
}

impl LocalMutation {
    /// Sets `status` on an existing record.
    pub fn status(id: RecordId, status: &str) -> Self {
        Self::field(id, "status", Value::from(status))
    }

    /// Sets one field on an existing record.
    pub fn field(id: RecordId, name: &str, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(name.to_string(), value);
        Self::Patch(id, fields)
    }
}

#[derive(Debug, Clone)]
enum Deferred {
    Push(PushEvent),
    Local(LocalMutation),
}

/// Store-update policy for one screen.
#[derive(Debug)]
pub struct Reconciler {
    store: EntityStore,
    seeded: bool,
    deferred: Vec<Deferred>,
}

impl Reconciler {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            store: EntityStore::new(kind),
            seeded: false,
            deferred: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.store.kind()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Whether the first fetch (or its failure) has been applied.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Inputs waiting for the first fetch.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Applies one input. Returns `true` if the screen should re-render.
    pub fn apply(&mut self, input: SyncInput) -> bool {
        match input {
            SyncInput::FetchCompleted(records) => {
                self.store.replace_all(records);
                self.seed();
                true
            }
            SyncInput::FetchFailed(reason) => {
                if self.seeded {
                    debug!("{}: refresh failed, keeping current records: {reason}", self.kind());
                    return false;
                }
                warn!("{}: initial fetch failed, starting empty: {reason}", self.kind());
                self.store.replace_all(Vec::new());
                self.seed();
                true
            }
            SyncInput::Push(event) if !self.seeded => {
                debug!("{}: deferring {} until fetch lands", self.kind(), event.name);
                self.deferred.push(Deferred::Push(event));
                false
            }
            SyncInput::Local(mutation) if !self.seeded => {
                self.deferred.push(Deferred::Local(mutation));
                false
            }
            SyncInput::Push(event) => self.apply_push(&event),
            SyncInput::Local(mutation) => self.apply_local(mutation),
        }
    }

    fn seed(&mut self) {
        self.seeded = true;
        let deferred = std::mem::take(&mut self.deferred);
        if !deferred.is_empty() {
            debug!("{}: replaying {} deferred inputs", self.kind(), deferred.len());
        }
        for input in deferred {
            match input {
                Deferred::Push(event) => self.apply_push(&event),
                Deferred::Local(mutation) => self.apply_local(mutation),
            };
        }
    }

    fn apply_push(&mut self, event: &PushEvent) -> bool {
        let kind = self.kind();
        let event_kind = match event.split_name() {
            Some((topic, event_kind)) if topic == kind.topic() => event_kind,
            _ => {
                debug!("{kind}: ignoring push {}", event.name);
                return false;
            }
        };

        match event_kind {
            EventKind::New | EventKind::Updated => match record_from_push(kind, &event.data) {
                Some(record) => {
                    self.store.upsert(record);
                    true
                }
                None => {
                    warn!("{kind}: {} payload has no record id", event.name);
                    false
                }
            },
            EventKind::Deleted => match event.target_id(kind) {
                Some(id) => self.store.remove(&id),
                None => {
                    warn!("{kind}: {} payload has no record id", event.name);
                    false
                }
            },
            EventKind::Resolved => {
                let Some(id) = event.target_id(kind) else {
                    debug!("{kind}: {} without id ignored", event.name);
                    return false;
                };
                let mut fields = event.data.as_object().cloned().unwrap_or_default();
                fields
                    .entry("status")
                    .or_insert_with(|| Value::from(REVIEWED));
                self.store.patch(&id, &fields)
            }
        }
    }

    fn apply_local(&mut self, mutation: LocalMutation) -> bool {
        match mutation {
            LocalMutation::Upsert(record) => {
                self.store.upsert(record);
                true
            }
            LocalMutation::Remove(id) => self.store.remove(&id),
            LocalMutation::Patch(id, fields) => self.store.patch(&id, &fields),
            LocalMutation::ResolveReport(id) => {
                let action = self
                    .store
                    .get(&id)
                    .and_then(ReportCategory::of)
                    .map(|category| match category {
                        ReportCategory::Users => "suspended",
                        ReportCategory::Posts | ReportCategory::Communities => "removed",
                    });
                let mut fields = Map::new();
                fields.insert("status".to_string(), Value::from(REVIEWED));
                if let Some(action) = action {
                    fields.insert("action".to_string(), Value::from(action));
                }
                self.store.patch(&id, &fields)
            }
        }
    }
}

// Push payloads sometimes carry only the type-specific id field.
fn record_from_push(kind: EntityKind, data: &Value) -> Option<Record> {
    let mut fields = data.as_object()?.clone();
    if !fields.contains_key("id") {
        let id = fields.get(kind.id_field())?.clone();
        fields.insert("id".to_string(), id);
    }
    Record::from_fields(fields).ok()
}
