//! SQLite storage engine
//!
//! File layout: one database file per table, `<dir>/<name>.sqlite`, holding a
//! single table `<name>(key TEXT PRIMARY KEY, value TEXT)`.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::Result;
use crate::name::TableName;
use crate::storage::{BackingTable, Entry, Storage};

/// Opens SQLite-backed tables inside a data directory
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    dir: PathBuf,
    wal: bool,
}

impl SqliteStorage {
    /// Storage rooted at `dir`, WAL journaling enabled
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            wal: true,
        }
    }

    /// Enable or disable WAL journaling for new connections
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    /// Data directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the database file for `name`
    pub fn path_for(&self, name: &TableName) -> PathBuf {
        self.dir.join(name.file_name())
    }
}

impl Storage for SqliteStorage {
    fn connect(&self, name: &TableName) -> Result<Box<dyn BackingTable>> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path_for(name);
        debug!("Opening SQLite database at {:?}", path);
        let conn = Connection::open(&path)?;

        if self.wal {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        }

        Ok(Box::new(SqliteTable::new(name.clone(), conn)))
    }
}

/// SQL text for one table, built once from the validated name
#[derive(Debug)]
struct Queries {
    create: String,
    upsert: String,
    lookup: String,
    delete: String,
    scan: String,
}

impl Queries {
    fn new(name: &TableName) -> Self {
        let table = name.quoted();
        Self {
            create: format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT)",
                table
            ),
            upsert: format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                table
            ),
            lookup: format!("SELECT value FROM {} WHERE key = ?1", table),
            delete: format!("DELETE FROM {} WHERE key = ?1", table),
            scan: format!("SELECT key, value FROM {}", table),
        }
    }
}

/// One SQLite connection bound to one table
pub struct SqliteTable {
    name: TableName,
    conn: Mutex<Connection>,
    sql: Queries,
}

impl SqliteTable {
    fn new(name: TableName, conn: Connection) -> Self {
        let sql = Queries::new(&name);
        Self {
            name,
            conn: Mutex::new(conn),
            sql,
        }
    }
}

impl BackingTable for SqliteTable {
    fn name(&self) -> &TableName {
        &self.name
    }

    fn create_if_absent(&self) -> Result<()> {
        self.conn.lock().execute(&self.sql.create, [])?;
        Ok(())
    }

    fn upsert(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&self.sql.upsert)?;
        stmt.execute(params![key, value])?;
        Ok(())
    }

    fn lookup(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&self.sql.lookup)?;

        // NULL values written by other tools read back as empty strings.
        let result = stmt.query_row(params![key], |row| row.get::<_, Option<String>>(0));
        match result {
            Ok(value) => Ok(Some(value.unwrap_or_default())),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&self.sql.delete)?;
        stmt.execute(params![key])?;
        Ok(())
    }

    fn scan_each(&self, visit: &mut dyn FnMut(Entry)) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&self.sql.scan)?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            visit(Entry {
                key: row.get(0)?,
                value: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let SqliteTable { name, conn, .. } = *self;
        conn.into_inner().close().map_err(|(_, e)| e)?;
        debug!("Closed SQLite connection for table '{}'", name);
        Ok(())
    }
}
