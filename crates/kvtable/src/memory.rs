//! Volatile in-memory storage engine
//!
//! Tables live as long as the [`MemoryStorage`] (or any clone of it), so a
//! reconnect through the same storage sees earlier writes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::name::TableName;
use crate::storage::{BackingTable, Entry, Storage};

type Rows = Arc<RwLock<HashMap<String, String>>>;
type Tables = Arc<Mutex<HashMap<TableName, Rows>>>;

/// In-memory storage engine; clones share the same tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Tables,
}

impl MemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `name` has been created
    pub fn has_table(&self, name: &TableName) -> bool {
        self.tables.lock().contains_key(name)
    }
}

impl Storage for MemoryStorage {
    fn connect(&self, name: &TableName) -> Result<Box<dyn BackingTable>> {
        Ok(Box::new(MemoryTable {
            name: name.clone(),
            tables: Arc::clone(&self.tables),
        }))
    }
}

struct MemoryTable {
    name: TableName,
    tables: Tables,
}

impl MemoryTable {
    fn rows(&self) -> Result<Rows> {
        self.tables
            .lock()
            .get(&self.name)
            .cloned()
            .ok_or_else(|| Error::NoSuchTable(self.name.to_string()))
    }
}

impl BackingTable for MemoryTable {
    fn name(&self) -> &TableName {
        &self.name
    }

    fn create_if_absent(&self) -> Result<()> {
        self.tables.lock().entry(self.name.clone()).or_default();
        Ok(())
    }

    fn upsert(&self, key: &str, value: &str) -> Result<()> {
        self.rows()?.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn lookup(&self, key: &str) -> Result<Option<String>> {
        Ok(self.rows()?.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.rows()?.write().remove(key);
        Ok(())
    }

    fn scan_each(&self, visit: &mut dyn FnMut(Entry)) -> Result<()> {
        let rows = self.rows()?;
        for (k, v) in rows.read().iter() {
            visit(Entry::new(k.clone(), v.clone()));
        }
        Ok(())
    }
}
