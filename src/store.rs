//! Main RecordStore struct tying the log, index and cache together.

use crate::error::{Result, StoreError};
use crate::records::{ItemIndex, ItemLog, LogEntry};
use crate::types::{Item, ItemFilter, ItemId, StoreStats};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base directory for the store.
    pub path: PathBuf,

    /// Read cache size (number of items).
    pub item_cache_size: usize,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Sync the log to disk every N writes.
    pub sync_interval: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./stockroom"),
            item_cache_size: 1000,
            create_if_missing: true,
            sync_interval: ItemLog::DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Result of rewriting the log down to live items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactionSummary {
    pub entries_before: u64,
    pub entries_after: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"STK\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// File name of the item log inside the store directory.
const LOG_FILE: &str = "items.log";

/// The inventory record store.
///
/// Items live in one collection keyed by a store-assigned id. Every
/// mutation is appended to the log; the index maps ids to the latest
/// version. The store performs no semantic validation of names or
/// quantities.
///
/// Single operations are consistent with each other: mutations hold the
/// access lock exclusively, reads share it. Nothing spans more than one
/// operation.
pub struct RecordStore {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Item log.
    log: ItemLog,

    /// Item index.
    index: ItemIndex,

    /// Recently read items.
    cache: Mutex<LruCache<ItemId, Item>>,

    /// Next id to assign. Never decreases.
    next_id: Mutex<ItemId>,

    /// Readers share, mutations and compaction are exclusive.
    access: RwLock<()>,
}

impl RecordStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::init(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn init(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;

        tracing::info!(path = %config.path.display(), "creating item store");
        Self::boot(config)
    }

    /// Open an existing store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;

        tracing::info!(path = %config.path.display(), "opening item store");
        Self::boot(config)
    }

    fn boot(config: StoreConfig) -> Result<Self> {
        let lock_file = Self::acquire_lock(&config.path)?;

        let log = ItemLog::open_with_sync_interval(config.path.join(LOG_FILE), config.sync_interval)?;
        let index = ItemIndex::new();
        let next_id = Self::replay(&log, &index)?;

        let cache_size = NonZeroUsize::new(config.item_cache_size).unwrap_or(NonZeroUsize::MIN);

        tracing::debug!(
            items = index.count(),
            log_entries = log.entry_count(),
            next_id = next_id.0,
            "item store ready"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            cache: Mutex::new(LruCache::new(cache_size)),
            next_id: Mutex::new(next_id),
            access: RwLock::new(()),
        })
    }

    /// Rebuild the index from the log. Returns the next id to assign.
    fn replay(log: &ItemLog, index: &ItemIndex) -> Result<ItemId> {
        let mut live: BTreeMap<ItemId, (Item, u64)> = BTreeMap::new();
        let mut next_id = ItemId(1);

        for result in log.iter_from(0) {
            let (offset, entry) = result?;
            match entry {
                LogEntry::Put(item) => {
                    next_id = next_id.max(item.id.next()?);
                    live.insert(item.id, (item, offset));
                }
                LogEntry::Delete(id) => {
                    next_id = next_id.max(id.next()?);
                    live.remove(&id);
                }
                LogEntry::Watermark(id) => {
                    next_id = next_id.max(id);
                }
            }
        }

        for (item, offset) in live.values() {
            index.insert(item, *offset);
        }

        Ok(next_id)
    }

    // --- Item Operations ---

    /// Persist a new item and return its id.
    pub fn create(&self, name: impl Into<String>, quantity: u64) -> Result<ItemId> {
        let _guard = self.access.write();
        let mut next_id = self.next_id.lock();

        let following = next_id.next()?;
        let item = Item {
            id: *next_id,
            name: name.into(),
            quantity,
        };

        let offset = self.log.append(&LogEntry::Put(item.clone()))?;
        *next_id = following;

        self.index.insert(&item, offset);
        tracing::debug!(id = %item.id, name = %item.name, quantity, "item created");

        let id = item.id;
        self.cache.lock().put(id, item);

        Ok(id)
    }

    /// Get an item by ID.
    pub fn get(&self, id: ItemId) -> Result<Item> {
        let _guard = self.access.read();
        self.load(id)
    }

    /// Set the quantity of an existing item. The name is left unchanged.
    pub fn update(&self, id: ItemId, quantity: u64) -> Result<Item> {
        let _guard = self.access.write();

        let current = self.load(id)?;
        let updated = Item {
            quantity,
            ..current.clone()
        };

        let offset = self.log.append(&LogEntry::Put(updated.clone()))?;

        self.index.remove(&current);
        self.index.insert(&updated, offset);
        self.cache.lock().put(id, updated.clone());

        tracing::debug!(%id, from = current.quantity, to = quantity, "item quantity updated");
        Ok(updated)
    }

    /// Remove an item. Removing an id that does not exist succeeds without
    /// writing anything.
    pub fn delete(&self, id: ItemId) -> Result<()> {
        let _guard = self.access.write();

        let current = match self.load(id) {
            Ok(item) => item,
            Err(e) if e.is_not_found() => {
                tracing::debug!(%id, "delete of missing item ignored");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.log.append(&LogEntry::Delete(id))?;

        self.index.remove(&current);
        self.cache.lock().pop(&id);

        tracing::debug!(%id, "item deleted");
        Ok(())
    }

    /// Iterate items in ascending id order, yielding those that match `filter`.
    ///
    /// The set of ids is captured now; each item is read when the cursor
    /// reaches it, and items deleted in the meantime are skipped.
    pub fn list(&self, filter: ItemFilter) -> ItemCursor<'_> {
        let ids = {
            let _guard = self.access.read();
            self.index.ids()
        };

        ItemCursor {
            store: self,
            ids: ids.into_iter(),
            filter,
        }
    }

    /// Every item, in id order.
    pub fn snapshot(&self) -> Result<Vec<Item>> {
        self.list(ItemFilter::All).collect()
    }

    /// Items whose name is exactly `name`.
    pub fn find_by_name(&self, name: &str) -> Result<Vec<Item>> {
        let _guard = self.access.read();
        self.index
            .ids_named(name)
            .into_iter()
            .map(|id| self.load(id))
            .collect()
    }

    /// Items with `quantity <= threshold`, lowest quantity first.
    pub fn low_stock(&self, threshold: u64) -> Result<Vec<Item>> {
        let _guard = self.access.read();
        self.index
            .ids_with_quantity(..=threshold)
            .into_iter()
            .map(|id| self.load(id))
            .collect()
    }

    /// Read an item without taking the access lock.
    fn load(&self, id: ItemId) -> Result<Item> {
        if let Some(item) = self.cache.lock().get(&id) {
            return Ok(item.clone());
        }

        let offset = self.index.offset(id).ok_or(StoreError::NotFound(id))?;
        match self.log.read_at(offset)? {
            LogEntry::Put(item) if item.id == id => {
                self.cache.lock().put(id, item.clone());
                Ok(item)
            }
            other => Err(StoreError::Corruption(format!(
                "expected item {} at offset {}, found {:?}",
                id, offset, other
            ))),
        }
    }

    // --- Store Operations ---

    /// Rewrite the log so it holds only the live items.
    ///
    /// A trailing watermark keeps the ids of dropped entries retired.
    pub fn compact(&self) -> Result<CompactionSummary> {
        let _guard = self.access.write();

        let entries_before = self.log.entry_count();
        let bytes_before = self.log.size();

        let mut entries = Vec::with_capacity(self.index.count() + 1);
        for id in self.index.ids() {
            entries.push(LogEntry::Put(self.load(id)?));
        }
        entries.push(LogEntry::Watermark(*self.next_id.lock()));

        self.log.rewrite(&entries)?;

        self.index.clear();
        self.cache.lock().clear();
        for result in self.log.iter_from(0) {
            let (offset, entry) = result?;
            if let LogEntry::Put(item) = entry {
                self.index.insert(&item, offset);
            }
        }

        let summary = CompactionSummary {
            entries_before,
            entries_after: self.log.entry_count(),
            bytes_before,
            bytes_after: self.log.size(),
        };

        tracing::info!(
            entries_before = summary.entries_before,
            entries_after = summary.entries_after,
            bytes_reclaimed = summary.bytes_before.saturating_sub(summary.bytes_after),
            "log compacted"
        );

        Ok(summary)
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let _guard = self.access.read();
        StoreStats {
            item_count: self.index.count() as u64,
            total_quantity: self.index.total_quantity(),
            log_entries: self.log.entry_count(),
            log_size_bytes: self.log.size(),
            next_id: self.next_id.lock().0,
        }
    }

    /// Sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!(error = %e, "sync on close failed");
        }
    }
}

/// Lazy iterator over the items of one `list` call.
///
/// Finite and single-use; call `list` again for a fresh pass.
pub struct ItemCursor<'a> {
    store: &'a RecordStore,
    ids: std::vec::IntoIter<ItemId>,
    filter: ItemFilter,
}

impl<'a> Iterator for ItemCursor<'a> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            match self.store.get(id) {
                Ok(item) if self.filter.matches(&item) => return Some(Ok(item)),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: dir.path().join("store"),
            item_cache_size: 100,
            create_if_missing: true,
            sync_interval: 1,
        }
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_create_store() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        assert!(store.path().join("MANIFEST").exists());
        assert!(store.path().join(LOG_FILE).exists());
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            create_if_missing: false,
            ..test_config(&dir)
        };

        let result = RecordStore::open_or_create(config);
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_create_and_get() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        let first = store.create("Widget", 10).unwrap();
        let second = store.create("Gadget", 5).unwrap();

        assert_eq!(first, ItemId(1));
        assert_eq!(second, ItemId(2));

        let item = store.get(first).unwrap();
        assert_eq!(item.name, "Widget");
        assert_eq!(item.quantity, 10);
    }

    #[test]
    fn test_store_does_not_validate() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        let id = store.create("", 0).unwrap();
        assert_eq!(store.get(id).unwrap().quantity, 0);
    }

    #[test]
    fn test_update_quantity() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        let id = store.create("Bolt", 3).unwrap();
        let updated = store.update(id, 0).unwrap();

        assert_eq!(updated.quantity, 0);
        assert_eq!(store.get(id).unwrap(), updated);
        assert_eq!(store.get(id).unwrap().name, "Bolt");
    }

    #[test]
    fn test_update_missing_item() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        let entries_before = store.stats().log_entries;
        let result = store.update(ItemId(42), 7);

        assert!(matches!(result, Err(StoreError::NotFound(ItemId(42)))));
        assert_eq!(store.stats().log_entries, entries_before);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        let id = store.create("Nut", 1).unwrap();
        store.delete(id).unwrap();

        assert!(matches!(store.get(id), Err(StoreError::NotFound(_))));

        let entries = store.stats().log_entries;
        store.delete(id).unwrap();
        assert_eq!(store.stats().log_entries, entries);
    }

    #[test]
    fn test_list_in_id_order_with_filter() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        store.create("Widget", 10).unwrap();
        store.create("Gadget", 5).unwrap();
        store.create("widget stand", 2).unwrap();

        let all: Vec<Item> = store.list(ItemFilter::All).collect::<Result<_>>().unwrap();
        assert_eq!(names(&all), vec!["Widget", "Gadget", "widget stand"]);

        let wid: Vec<Item> = store
            .list(ItemFilter::name_contains("WID"))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(names(&wid), vec!["Widget", "widget stand"]);
    }

    #[test]
    fn test_cursor_skips_items_deleted_mid_iteration() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        let a = store.create("a", 1).unwrap();
        let b = store.create("b", 1).unwrap();
        let c = store.create("c", 1).unwrap();

        let mut cursor = store.list(ItemFilter::All);
        assert_eq!(cursor.next().unwrap().unwrap().id, a);

        store.delete(b).unwrap();

        assert_eq!(cursor.next().unwrap().unwrap().id, c);
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_secondary_lookups() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        store.create("Bolt", 3).unwrap();
        store.create("Nut", 40).unwrap();
        let bolt = store.create("Bolt", 1).unwrap();

        assert_eq!(store.find_by_name("Bolt").unwrap().len(), 2);

        let low = store.low_stock(3).unwrap();
        assert_eq!(low.len(), 2);
        assert_eq!(low[0].id, bolt);

        store.update(bolt, 100).unwrap();
        assert_eq!(store.low_stock(3).unwrap().len(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        {
            let store = RecordStore::init(config.clone()).unwrap();
            let a = store.create("Widget", 10).unwrap();
            let b = store.create("Gadget", 5).unwrap();
            store.update(a, 12).unwrap();
            store.delete(b).unwrap();
        }

        let store = RecordStore::open(config).unwrap();
        let items = store.snapshot().unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Widget");
        assert_eq!(items[0].quantity, 12);
    }

    #[test]
    fn test_ids_not_reused_after_reopen() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        {
            let store = RecordStore::init(config.clone()).unwrap();
            store.create("a", 1).unwrap();
            let last = store.create("b", 1).unwrap();
            store.delete(last).unwrap();
        }

        let store = RecordStore::open(config).unwrap();
        assert_eq!(store.create("c", 1).unwrap(), ItemId(3));
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let _store1 = RecordStore::init(config.clone()).unwrap();

        let result = RecordStore::open(config);
        assert!(matches!(result, Err(StoreError::Locked)));
    }

    #[test]
    fn test_compact() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        {
            let store = RecordStore::init(config.clone()).unwrap();
            let a = store.create("Widget", 1).unwrap();
            for q in 2..=10 {
                store.update(a, q).unwrap();
            }
            let b = store.create("Gadget", 5).unwrap();
            store.delete(b).unwrap();

            let summary = store.compact().unwrap();
            assert_eq!(summary.entries_before, 12);
            assert_eq!(summary.entries_after, 2);
            assert!(summary.bytes_after < summary.bytes_before);

            assert_eq!(store.get(a).unwrap().quantity, 10);
            store.update(a, 11).unwrap();
        }

        let store = RecordStore::open(config).unwrap();
        assert_eq!(store.snapshot().unwrap().len(), 1);
        assert_eq!(store.get(ItemId(1)).unwrap().quantity, 11);
        // Gadget's id stays retired
        assert_eq!(store.create("Sprocket", 1).unwrap(), ItemId(3));
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::init(test_config(&dir)).unwrap();

        store.create("Widget", 10).unwrap();
        store.create("Gadget", 5).unwrap();

        let stats = store.stats();
        assert_eq!(stats.item_count, 2);
        assert_eq!(stats.total_quantity, 15);
        assert_eq!(stats.log_entries, 2);
        assert_eq!(stats.next_id, 3);
    }

    #[test]
    fn test_open_or_create_then_create_items() {
        let dir = TempDir::new().unwrap();

        let id = {
            let store = RecordStore::open_or_create(test_config(&dir)).unwrap();
            store.create("Widget", 3).unwrap()
        };

        // Second call finds the manifest and opens instead of initialising
        let store = RecordStore::open_or_create(test_config(&dir)).unwrap();
        assert_eq!(store.get(id).unwrap().name, "Widget");
        assert_eq!(store.create("Gadget", 1).unwrap(), id.next().unwrap());
    }

    #[test]
    fn test_replay_rejects_id_without_successor() {
        let dir = TempDir::new().unwrap();
        drop(RecordStore::init(test_config(&dir)).unwrap());

        {
            let log = ItemLog::open(dir.path().join("store").join(LOG_FILE)).unwrap();
            log.append(&LogEntry::Put(Item {
                id: ItemId(u64::MAX),
                name: "bogus".into(),
                quantity: 1,
            }))
            .unwrap();
        }

        let result = RecordStore::open(test_config(&dir));
        assert!(matches!(result, Err(StoreError::Corruption(_))));
    }
}
