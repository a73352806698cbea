//! Store configuration

use std::path::PathBuf;

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Configuration for a [`CacheStore`](crate::CacheStore)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one database file per table
    pub data_dir: PathBuf,

    /// Initialize tables on first use instead of rejecting them
    pub auto_initialize: bool,

    /// Use SQLite WAL journaling
    pub wal: bool,

    /// Tables to initialize when the store is opened
    pub tables: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            auto_initialize: false,
            wal: true,
            tables: Vec::new(),
        }
    }
}

impl StoreConfig {
    /// Configuration rooted at `data_dir`, other fields default
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Set whether unknown tables are created on first use
    pub fn with_auto_initialize(mut self, auto_initialize: bool) -> Self {
        self.auto_initialize = auto_initialize;
        self
    }

    /// Set WAL journaling
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    /// Add a table to initialize at open time
    pub fn with_table(mut self, name: impl Into<String>) -> Self {
        self.tables.push(name.into());
        self
    }
}
