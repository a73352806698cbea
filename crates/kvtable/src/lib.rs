//! # kvtable
//!
//! Durable key/value tables used as the backing layer of a write-through
//! cache.
//!
//! ## Primitives
//! - create-if-absent, atomic upsert, point lookup, idempotent delete, scan
//! - Table names are validated identifiers ([`TableName`])
//! - Engines: SQLite (one file per table) and volatile in-memory

#![warn(missing_docs)]

mod error;
mod memory;
mod name;
mod sqlite;
mod storage;

pub use error::{Error, Result};
pub use memory::MemoryStorage;
pub use name::{TableName, MAX_NAME_LEN};
pub use sqlite::{SqliteStorage, SqliteTable};
pub use storage::{BackingTable, Entry, Storage};
