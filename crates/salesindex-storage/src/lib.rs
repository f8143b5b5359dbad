//! salesindex-storage: document store backends for the sales indexer.
//!
//! Backends:
//! - [`memory`]: in-memory, always built (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx`, behind the `sqlite` feature
//!
//! Both keep every document versioned by block range and implement
//! [`DocumentStore`](salesindex_core::DocumentStore) plus
//! [`CheckpointStore`](salesindex_core::CheckpointStore).

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
