//! # kvcache
//!
//! Write-through key/value store: an in-memory hot cache per table kept
//! consistent with a durable kvtable backing table.
//!
//! ## Policy
//! - **Writes**: applied to the hot cache and the backing table before
//!   returning
//! - **Reads**: served from the hot cache; a miss reads the backing table and
//!   fills the cache
//! - **Locking**: one readers-writer lock per table; puts and deletes are
//!   exclusive, reads are shared
//! - **No eviction**: cached entries live until deleted or invalidated

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod hot;
mod stats;

pub use cache::CacheStore;
pub use config::{StoreConfig, DEFAULT_DATA_DIR};
pub use error::{Error, Result};
pub use kvtable::{
    BackingTable, Entry, Error as StorageError, MemoryStorage, SqliteStorage, Storage, TableName,
};
pub use stats::CacheStats;
