//! CacheStore: write-through hot cache over kvtable storage

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ahash::RandomState;
use kvtable::{BackingTable, Entry, SqliteStorage, Storage, TableName};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::hot::HotCache;
use crate::stats::CacheStats;

/// One initialized table: its backing connection and its hot cache.
///
/// The `hot` lock also serializes logical operations against `backing`:
/// writers hold it exclusively across the cache update and the backing
/// write.
struct Table {
    backing: Box<dyn BackingTable>,
    hot: RwLock<HotCache>,
}

impl Table {
    fn name(&self) -> &TableName {
        self.backing.name()
    }
}

/// Write-through key/value store combining per-table hot caches with
/// durable backing tables
pub struct CacheStore {
    /// Engine used to open backing tables
    storage: Box<dyn Storage>,

    /// Initialized tables
    tables: RwLock<HashMap<TableName, Arc<Table>, RandomState>>,

    /// Cache statistics
    stats: CacheStats,

    config: StoreConfig,
}

impl CacheStore {
    /// Open a SQLite-backed store and initialize `config.tables`
    ///
    /// # Arguments
    /// * `config` - Data directory and initialization policy
    ///
    /// # Returns
    /// * `Result<CacheStore>` - Store handle
    pub fn open(config: StoreConfig) -> Result<Self> {
        let storage = SqliteStorage::new(&config.data_dir).with_wal(config.wal);
        Self::with_storage(storage, config)
    }

    /// Open a store over any storage engine and initialize `config.tables`
    pub fn with_storage<S: Storage + 'static>(storage: S, config: StoreConfig) -> Result<Self> {
        let store = Self {
            storage: Box::new(storage),
            tables: RwLock::new(HashMap::with_hasher(RandomState::new())),
            stats: CacheStats::new(),
            config,
        };

        for name in store.config.tables.clone() {
            store.initialize(&name)?;
        }

        Ok(store)
    }

    /// Ensure the backing table for `name` exists and hold a connection to
    /// it. Idempotent; the hot cache is not touched.
    pub fn initialize(&self, name: &str) -> Result<()> {
        let name = parse_name(name)?;
        self.open_table(&name).map(|_| ())
    }

    /// Write `value` for `key` to the hot cache and the backing table
    ///
    /// On [`Error::WriteFailure`] the hot cache already holds `value` while
    /// the backing table does not; call [`CacheStore::invalidate`] to drop
    /// the cached copy.
    pub fn put(&self, name: &str, key: &str, value: &str) -> Result<()> {
        let table = self.table(name)?;
        let mut hot = table.hot.write();

        hot.insert(key.to_string(), value.to_string());
        self.stats.record_write();

        table.backing.upsert(key, value).map_err(|source| {
            self.stats.record_write_failure();
            warn!(
                "Upsert of {:?} into '{}' failed, cache is ahead of storage: {}",
                key,
                table.name(),
                source
            );
            Error::WriteFailure {
                table: table.name().to_string(),
                key: key.to_string(),
                source,
            }
        })
    }

    /// Read `key`, filling the hot cache from the backing table on a miss
    ///
    /// # Returns
    /// * `Ok(Some(value))` - found in either layer
    /// * `Ok(None)` - absent from both layers
    /// * `Err(Error::ReadFailure)` - the backing table could not answer
    pub fn get(&self, name: &str, key: &str) -> Result<Option<String>> {
        let table = self.table(name)?;

        {
            let hot = table.hot.read();
            if let Some(value) = hot.get(key) {
                self.stats.record_hit();
                return Ok(Some(value.clone()));
            }
        }

        // Plain readers keep going; writers wait until the fill is done, so a
        // put or delete can never be overwritten by a stale fill.
        let hot = table.hot.upgradable_read();
        if let Some(value) = hot.get(key) {
            self.stats.record_hit();
            return Ok(Some(value.clone()));
        }

        self.stats.record_miss();
        match table.backing.lookup(key) {
            Ok(Some(value)) => {
                let mut hot = RwLockUpgradableReadGuard::upgrade(hot);
                hot.insert(key.to_string(), value.clone());
                self.stats.record_fill();
                debug!("Filled {:?} from '{}'", key, table.name());
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(source) => {
                self.stats.record_read_failure();
                error!("Lookup of {:?} in '{}' failed: {}", key, table.name(), source);
                Err(Error::ReadFailure {
                    table: table.name().to_string(),
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Remove `key` from the hot cache and the backing table. Deleting a
    /// missing key succeeds.
    pub fn delete(&self, name: &str, key: &str) -> Result<()> {
        let table = self.table(name)?;
        let mut hot = table.hot.write();

        hot.remove(key);
        self.stats.record_delete();

        table.backing.delete(key).map_err(|source| {
            self.stats.record_write_failure();
            warn!(
                "Delete of {:?} from '{}' failed, storage still holds it: {}",
                key,
                table.name(),
                source
            );
            Error::WriteFailure {
                table: table.name().to_string(),
                key: key.to_string(),
                source,
            }
        })
    }

    /// Every entry of the table, one per key, sorted by key
    ///
    /// Cached values win over backing values. If the backing scan fails the
    /// cached entries are still returned.
    pub fn list(&self, name: &str) -> Result<Vec<Entry>> {
        let table = self.table(name)?;
        let hot = table.hot.read();

        let mut merged = BTreeMap::new();
        let scanned = table.backing.scan_each(&mut |e| {
            merged.insert(e.key, e.value);
        });
        if let Err(e) = scanned {
            warn!(
                "Scan of '{}' failed, list may be missing uncached entries: {}",
                table.name(),
                e
            );
        }
        merged.extend(hot.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(merged.into_iter().map(Entry::from).collect())
    }

    /// Drop `key` from the hot cache only. The next read goes to the
    /// backing table.
    ///
    /// # Returns
    /// * `Result<bool>` - whether the key was cached
    pub fn invalidate(&self, name: &str, key: &str) -> Result<bool> {
        let table = self.table(name)?;
        let removed = table.hot.write().remove(key).is_some();
        if removed {
            self.stats.record_invalidation();
        }
        Ok(removed)
    }

    /// Clear every hot cache (storage remains unchanged)
    pub fn clear_cache(&self) {
        let tables: Vec<_> = self.tables.read().values().cloned().collect();
        for table in tables {
            table.hot.write().clear();
        }
        self.stats.reset();
    }

    /// Number of cached entries for `name`
    pub fn cache_len(&self, name: &str) -> Result<usize> {
        Ok(self.table(name)?.hot.read().len())
    }

    /// Names of initialized tables, sorted
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.read().keys().map(|n| n.to_string()).collect();
        names.sort();
        names
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Release every backing connection
    ///
    /// All tables are closed even if one fails; the first failure is
    /// returned.
    pub fn close(self) -> Result<()> {
        let mut first_err = None;

        for (name, table) in self.tables.into_inner() {
            // No clones outlive a call on &self.
            let Ok(table) = Arc::try_unwrap(table) else {
                continue;
            };
            if let Err(source) = table.backing.close() {
                warn!("Closing '{}' failed: {}", name, source);
                first_err.get_or_insert(Error::CloseFailure {
                    table: name.to_string(),
                    source,
                });
            }
        }

        info!("Cache store closed");
        first_err.map_or(Ok(()), Err)
    }

    /// Resolve an initialized table, or initialize it when
    /// `auto_initialize` is set
    fn table(&self, name: &str) -> Result<Arc<Table>> {
        let name = parse_name(name)?;

        if let Some(table) = self.tables.read().get(&name) {
            return Ok(Arc::clone(table));
        }

        if self.config.auto_initialize {
            return self.open_table(&name);
        }

        Err(Error::StorageUnavailable {
            table: name.to_string(),
            source: kvtable::Error::NoSuchTable(name.to_string()),
        })
    }

    fn open_table(&self, name: &TableName) -> Result<Arc<Table>> {
        if let Some(table) = self.tables.read().get(name) {
            return Ok(Arc::clone(table));
        }

        let mut tables = self.tables.write();
        // Another caller may have won the race for the write lock.
        if let Some(table) = tables.get(name) {
            return Ok(Arc::clone(table));
        }

        let backing = self
            .storage
            .connect(name)
            .map_err(|source| Error::StorageUnavailable {
                table: name.to_string(),
                source,
            })?;

        backing
            .create_if_absent()
            .map_err(|source| Error::SchemaError {
                table: name.to_string(),
                source,
            })?;

        let table = Arc::new(Table {
            backing,
            hot: RwLock::new(HotCache::new()),
        });
        tables.insert(name.clone(), Arc::clone(&table));
        info!("Table '{}' initialized", name);

        Ok(table)
    }
}

fn parse_name(name: &str) -> Result<TableName> {
    TableName::parse(name).map_err(Error::InvalidTableName)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvtable::MemoryStorage;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Failure switches and access counters shared with the test body
    #[derive(Default)]
    struct Probe {
        lookups: AtomicUsize,
        fail_connect: AtomicBool,
        fail_create: AtomicBool,
        fail_writes: AtomicBool,
        fail_reads: AtomicBool,
        fail_scan: AtomicBool,
    }

    impl Probe {
        fn check(flag: &AtomicBool) -> kvtable::Result<()> {
            if flag.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::Other, "injected failure").into())
            } else {
                Ok(())
            }
        }
    }

    struct ProbeStorage {
        inner: MemoryStorage,
        probe: Arc<Probe>,
    }

    struct ProbeTable {
        inner: Box<dyn BackingTable>,
        probe: Arc<Probe>,
    }

    impl Storage for ProbeStorage {
        fn connect(&self, name: &TableName) -> kvtable::Result<Box<dyn BackingTable>> {
            Probe::check(&self.probe.fail_connect)?;
            Ok(Box::new(ProbeTable {
                inner: self.inner.connect(name)?,
                probe: Arc::clone(&self.probe),
            }))
        }
    }

    impl BackingTable for ProbeTable {
        fn name(&self) -> &TableName {
            self.inner.name()
        }

        fn create_if_absent(&self) -> kvtable::Result<()> {
            Probe::check(&self.probe.fail_create)?;
            self.inner.create_if_absent()
        }

        fn upsert(&self, key: &str, value: &str) -> kvtable::Result<()> {
            Probe::check(&self.probe.fail_writes)?;
            self.inner.upsert(key, value)
        }

        fn lookup(&self, key: &str) -> kvtable::Result<Option<String>> {
            self.probe.lookups.fetch_add(1, Ordering::SeqCst);
            Probe::check(&self.probe.fail_reads)?;
            self.inner.lookup(key)
        }

        fn delete(&self, key: &str) -> kvtable::Result<()> {
            Probe::check(&self.probe.fail_writes)?;
            self.inner.delete(key)
        }

        fn scan_each(&self, visit: &mut dyn FnMut(Entry)) -> kvtable::Result<()> {
            Probe::check(&self.probe.fail_scan)?;
            self.inner.scan_each(visit)
        }
    }

    fn probed(memory: &MemoryStorage) -> (CacheStore, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let storage = ProbeStorage {
            inner: memory.clone(),
            probe: Arc::clone(&probe),
        };
        let store = CacheStore::with_storage(storage, StoreConfig::default()).unwrap();
        store.initialize("t").unwrap();
        (store, probe)
    }

    fn backing(memory: &MemoryStorage, name: &str) -> Box<dyn BackingTable> {
        let table = memory.connect(&TableName::parse(name).unwrap()).unwrap();
        table.create_if_absent().unwrap();
        table
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(StoreConfig::new(dir.path()).with_table("t")).unwrap();

        store.put("t", "a", "1").unwrap();
        assert_eq!(store.get("t", "a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_write_survives_restart() {
        let dir = TempDir::new().unwrap();

        {
            let store = CacheStore::open(StoreConfig::new(dir.path()).with_table("t")).unwrap();
            store.put("t", "a", "1").unwrap();
            store.close().unwrap();
        }

        let store = CacheStore::open(StoreConfig::new(dir.path()).with_table("t")).unwrap();
        assert_eq!(store.cache_len("t").unwrap(), 0);
        assert_eq!(store.get("t", "a").unwrap(), Some("1".to_string()));
        assert_eq!(store.stats().fills(), 1);
    }

    #[test]
    fn test_delete_removes_both_layers() {
        let memory = MemoryStorage::new();
        let (store, _) = probed(&memory);

        store.put("t", "a", "1").unwrap();
        store.delete("t", "a").unwrap();

        assert_eq!(store.get("t", "a").unwrap(), None);
        assert_eq!(store.cache_len("t").unwrap(), 0);
        assert_eq!(backing(&memory, "t").lookup("a").unwrap(), None);
    }

    #[test]
    fn test_upsert_overwrites() {
        let memory = MemoryStorage::new();
        let (store, _) = probed(&memory);

        store.put("t", "a", "1").unwrap();
        store.put("t", "a", "2").unwrap();

        assert_eq!(store.get("t", "a").unwrap(), Some("2".to_string()));
        assert_eq!(backing(&memory, "t").lookup("a").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_cache_fill_on_miss() {
        let memory = MemoryStorage::new();
        backing(&memory, "t").upsert("x", "y").unwrap();
        let (store, probe) = probed(&memory);

        assert_eq!(store.get("t", "x").unwrap(), Some("y".to_string()));
        assert_eq!(probe.lookups.load(Ordering::SeqCst), 1);

        assert_eq!(store.get("t", "x").unwrap(), Some("y".to_string()));
        assert_eq!(probe.lookups.load(Ordering::SeqCst), 1);

        assert_eq!(store.stats().misses(), 1);
        assert_eq!(store.stats().fills(), 1);
        assert_eq!(store.stats().hits(), 1);
    }

    #[test]
    fn test_miss_on_absent_key_does_not_fill() {
        let memory = MemoryStorage::new();
        let (store, _) = probed(&memory);

        assert_eq!(store.get("t", "nope").unwrap(), None);
        assert_eq!(store.cache_len("t").unwrap(), 0);
        assert_eq!(store.stats().fills(), 0);
    }

    #[test]
    fn test_idempotent_delete() {
        let memory = MemoryStorage::new();
        let (store, _) = probed(&memory);

        store.delete("t", "nonexistent").unwrap();
        store.delete("t", "nonexistent").unwrap();
    }

    #[test]
    fn test_list_without_duplicates() {
        let memory = MemoryStorage::new();
        backing(&memory, "t").upsert("b", "2").unwrap();
        let (store, _) = probed(&memory);

        store.put("t", "a", "1").unwrap();
        store.get("t", "b").unwrap();

        assert_eq!(
            store.list("t").unwrap(),
            vec![Entry::new("a", "1"), Entry::new("b", "2")]
        );
    }

    #[test]
    fn test_list_prefers_cached_value() {
        let memory = MemoryStorage::new();
        let (store, _) = probed(&memory);

        store.put("t", "a", "new").unwrap();
        // Another writer sharing the backing table
        backing(&memory, "t").upsert("a", "old").unwrap();

        assert_eq!(store.list("t").unwrap(), vec![Entry::new("a", "new")]);
    }

    #[test]
    fn test_list_scan_failure_returns_cached() {
        let memory = MemoryStorage::new();
        backing(&memory, "t").upsert("cold", "1").unwrap();
        let (store, probe) = probed(&memory);

        store.put("t", "hot", "2").unwrap();
        probe.fail_scan.store(true, Ordering::SeqCst);

        assert_eq!(store.list("t").unwrap(), vec![Entry::new("hot", "2")]);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let memory = MemoryStorage::new();
        let (store, probe) = probed(&memory);

        probe.fail_writes.store(true, Ordering::SeqCst);
        let err = store.put("t", "a", "1").unwrap_err();
        assert!(matches!(err, Error::WriteFailure { ref key, .. } if key == "a"));
        assert_eq!(store.stats().write_failures(), 1);

        // Cache is ahead of storage until invalidated
        assert_eq!(store.get("t", "a").unwrap(), Some("1".to_string()));
        assert_eq!(backing(&memory, "t").lookup("a").unwrap(), None);

        assert!(store.invalidate("t", "a").unwrap());
        assert_eq!(store.get("t", "a").unwrap(), None);
        assert_eq!(store.stats().invalidations(), 1);
    }

    #[test]
    fn test_delete_failure_is_reported() {
        let memory = MemoryStorage::new();
        let (store, probe) = probed(&memory);

        store.put("t", "a", "1").unwrap();
        probe.fail_writes.store(true, Ordering::SeqCst);

        let err = store.delete("t", "a").unwrap_err();
        assert!(matches!(err, Error::WriteFailure { .. }));
        assert_eq!(store.cache_len("t").unwrap(), 0);
        assert_eq!(backing(&memory, "t").lookup("a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_read_failure_is_not_absence() {
        let memory = MemoryStorage::new();
        let (store, probe) = probed(&memory);

        probe.fail_reads.store(true, Ordering::SeqCst);
        let err = store.get("t", "a").unwrap_err();
        assert!(matches!(err, Error::ReadFailure { .. }));
        assert_eq!(store.stats().read_failures(), 1);

        // Cached keys never touch the backing table
        store.put("t", "b", "2").unwrap();
        assert_eq!(store.get("t", "b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_uninitialized_table() {
        let store = CacheStore::with_storage(MemoryStorage::new(), StoreConfig::default()).unwrap();

        let err = store.put("missing", "a", "1").unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable { .. }));
        assert!(matches!(store.get("missing", "a"), Err(Error::StorageUnavailable { .. })));
        assert!(matches!(store.list("missing"), Err(Error::StorageUnavailable { .. })));
        assert!(store.tables().is_empty());
    }

    #[test]
    fn test_auto_initialize() {
        let memory = MemoryStorage::new();
        let config = StoreConfig::default().with_auto_initialize(true);
        let store = CacheStore::with_storage(memory.clone(), config).unwrap();

        store.put("fresh", "a", "1").unwrap();
        assert_eq!(store.tables(), vec!["fresh"]);
        assert!(memory.has_table(&TableName::parse("fresh").unwrap()));
    }

    #[test]
    fn test_invalid_table_name() {
        let store = CacheStore::with_storage(
            MemoryStorage::new(),
            StoreConfig::default().with_auto_initialize(true),
        )
        .unwrap();

        assert!(matches!(
            store.initialize("t; DROP TABLE t"),
            Err(Error::InvalidTableName(_))
        ));
        assert!(matches!(store.put("", "a", "1"), Err(Error::InvalidTableName(_))));
    }

    #[test]
    fn test_initialize_idempotent() {
        let memory = MemoryStorage::new();
        let (store, _) = probed(&memory);

        store.put("t", "a", "1").unwrap();
        store.initialize("t").unwrap();
        store.initialize("t").unwrap();

        assert_eq!(store.tables(), vec!["t"]);
        assert_eq!(store.cache_len("t").unwrap(), 1);
    }

    #[test]
    fn test_initialize_failures() {
        let probe = Arc::new(Probe::default());
        let storage = ProbeStorage {
            inner: MemoryStorage::new(),
            probe: Arc::clone(&probe),
        };
        let store = CacheStore::with_storage(storage, StoreConfig::default()).unwrap();

        probe.fail_connect.store(true, Ordering::SeqCst);
        assert!(matches!(store.initialize("t"), Err(Error::StorageUnavailable { .. })));

        probe.fail_connect.store(false, Ordering::SeqCst);
        probe.fail_create.store(true, Ordering::SeqCst);
        assert!(matches!(store.initialize("t"), Err(Error::SchemaError { .. })));
        assert!(store.tables().is_empty());

        probe.fail_create.store(false, Ordering::SeqCst);
        store.initialize("t").unwrap();
    }

    #[test]
    fn test_open_initializes_configured_tables() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path())
            .with_table("users")
            .with_table("orders");
        let store = CacheStore::open(config).unwrap();

        assert_eq!(store.tables(), vec!["orders", "users"]);
        assert!(dir.path().join("users.sqlite").exists());
        assert!(dir.path().join("orders.sqlite").exists());
    }

    #[test]
    fn test_tables_are_isolated() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path())
            .with_table("users")
            .with_table("orders");
        let store = CacheStore::open(config).unwrap();

        store.put("users", "k", "user").unwrap();
        store.put("orders", "k", "order").unwrap();

        assert_eq!(store.get("users", "k").unwrap(), Some("user".to_string()));
        assert_eq!(store.get("orders", "k").unwrap(), Some("order".to_string()));
        assert_eq!(store.list("users").unwrap(), vec![Entry::new("k", "user")]);
    }

    #[test]
    fn test_clear_cache() {
        let memory = MemoryStorage::new();
        let (store, _) = probed(&memory);

        store.put("t", "a", "1").unwrap();
        store.put("t", "b", "2").unwrap();
        assert_eq!(store.cache_len("t").unwrap(), 2);

        store.clear_cache();
        assert_eq!(store.cache_len("t").unwrap(), 0);
        assert_eq!(store.get("t", "a").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_concurrent_writers() {
        let memory = MemoryStorage::new();
        let (store, _) = probed(&memory);

        std::thread::scope(|s| {
            for t in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..50 {
                        store.put("t", &format!("{}-{}", t, i), &i.to_string()).unwrap();
                    }
                });
            }
        });

        for t in 0..8 {
            for i in 0..50 {
                assert_eq!(
                    store.get("t", &format!("{}-{}", t, i)).unwrap(),
                    Some(i.to_string())
                );
            }
        }
        assert_eq!(backing(&memory, "t").scan().unwrap().len(), 400);
        assert_eq!(store.list("t").unwrap().len(), 400);
    }

    #[test]
    fn test_concurrent_readers_fill_once() {
        let memory = MemoryStorage::new();
        backing(&memory, "t").upsert("x", "y").unwrap();
        let (store, probe) = probed(&memory);

        std::thread::scope(|s| {
            for _ in 0..16 {
                let store = &store;
                s.spawn(move || {
                    for _ in 0..20 {
                        assert_eq!(store.get("t", "x").unwrap(), Some("y".to_string()));
                    }
                });
            }
        });

        assert_eq!(probe.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats().fills(), 1);
        assert_eq!(store.stats().hits(), 16 * 20 - 1);
    }

    #[test]
    fn test_fill_never_resurrects_deleted_key() {
        let memory = MemoryStorage::new();
        backing(&memory, "t").upsert("x", "old").unwrap();
        let (store, _) = probed(&memory);

        std::thread::scope(|s| {
            let reader = &store;
            s.spawn(move || {
                for _ in 0..200 {
                    reader.get("t", "x").unwrap();
                }
            });
            let writer = &store;
            s.spawn(move || {
                for i in 0..200 {
                    writer.put("t", "x", &i.to_string()).unwrap();
                }
                writer.delete("t", "x").unwrap();
            });
        });

        assert_eq!(store.get("t", "x").unwrap(), None);
    }
}
