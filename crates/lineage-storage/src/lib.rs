//! Lineage Storage - Persistence and cache collaborators for the engine
//!
//! This crate defines the storage and cache traits the engine consumes
//! and provides in-memory, SQLite and ReDB backends plus an LRU cache.

#![allow(clippy::result_large_err)]

pub mod cache;
pub mod error;
pub mod migration;
pub mod traits;

#[cfg(feature = "redb")]
pub mod redb;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod memory;

pub use cache::{CacheBackend, CacheKind, MemoryCache, MAX_TTL};
pub use error::{StorageError, StorageResult};
pub use migration::{Migratable, SchemaVersion, CURRENT_VERSION};
pub use traits::StorageBackend;

#[cfg(feature = "redb")]
pub use redb::RedbStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

pub use memory::MemoryStorage;
