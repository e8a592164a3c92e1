//! Persistence backends for graphweave
//!
//! The in-memory graph is backed by any `PersistentStore`.
//! The bundled implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{OpenStore, PersistentStore, StorageError, StorageResult};
