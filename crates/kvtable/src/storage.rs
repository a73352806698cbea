//! Backing table primitives
//!
//! A [`Storage`] opens connections to named tables; a [`BackingTable`] is one
//! open connection exposing the five primitives the cache layer relies on.

use std::sync::Arc;

use crate::error::Result;
use crate::name::TableName;

/// A single key/value row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Row key, unique within a table
    pub key: String,
    /// Row value
    pub value: String,
}

impl Entry {
    /// Create a new entry
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<(String, String)> for Entry {
    fn from((key, value): (String, String)) -> Self {
        Self { key, value }
    }
}

/// A storage engine able to open connections to named tables
pub trait Storage: Send + Sync {
    /// Open a connection to `name`. Does not create the table.
    fn connect(&self, name: &TableName) -> Result<Box<dyn BackingTable>>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn connect(&self, name: &TableName) -> Result<Box<dyn BackingTable>> {
        (**self).connect(name)
    }
}

/// An open connection to one durable key/value table
pub trait BackingTable: Send + Sync {
    /// Name of the table this handle is bound to
    fn name(&self) -> &TableName;

    /// Create the table if it does not exist yet (idempotent)
    fn create_if_absent(&self) -> Result<()>;

    /// Insert or overwrite `key` in a single atomic statement
    fn upsert(&self, key: &str, value: &str) -> Result<()>;

    /// Point lookup. A missing row is `Ok(None)`, never an error.
    fn lookup(&self, key: &str) -> Result<Option<String>>;

    /// Delete `key`. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Stream every row once to `visit`, in no particular order. Rows
    /// visited before an error are not replayed.
    fn scan_each(&self, visit: &mut dyn FnMut(Entry)) -> Result<()>;

    /// Read every row once into a vector
    fn scan(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        self.scan_each(&mut |entry| entries.push(entry))?;
        Ok(entries)
    }

    /// Release the connection
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
