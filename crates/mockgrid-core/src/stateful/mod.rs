//! In-memory stateful resources with CRUD semantics.
//!
//! Each resource is an insertion-ordered map from id string to an opaque
//! JSON object, guarded by its own readers-writer lock. Reads hand out deep
//! copies so callers can never mutate internal state; the seed snapshot
//! taken at construction is immutable and backs `reset`.

mod store;

pub use store::ResourceStore;
