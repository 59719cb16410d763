//! Record storage for Modboard screens.
//!
//! Each screen owns one [`EntityStore`]: an ordered collection of records of a
//! single entity kind, keyed by record id. The store is purely in-memory and
//! synchronous; the sync layer decides when and in what order it is mutated.
//!
//! # Invariants
//!
//! - Record ids are unique after any sequence of operations.
//! - Updating an existing id keeps its position; new ids enter at the front.
//! - Removing an id that is not present is a no-op, never an error.

mod entity_store;

pub use entity_store::EntityStore;
