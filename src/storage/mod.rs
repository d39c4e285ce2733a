//! Storage backends for the concept graph
//!
//! Backends implement the `GraphStore` trait. `SqliteStore` is the persistent
//! backend; `MemoryStore` is a lock-sharded arena for tests and embedding.

mod memory;
mod records;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{GraphStore, NodeFilter, OpenStore, Sighting, StorageError, StorageResult};
