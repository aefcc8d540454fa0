//! JSON file store backend
//!
//! Each namespace lives in its own JSON file. Reads are served from an
//! in-memory cache; every batch is applied to a staged copy, written to a
//! temp file, renamed over the original, and only then swapped into the
//! cache. A crash mid-write leaves the previous file intact.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

use super::{DurableStore, StoreBatch, StoreProvider, StoredValue};
use crate::error::{KeychainError, Result};

/// Current file format version
const FILE_VERSION: u32 = 1;

/// Subdirectory of the data directory holding namespace files
pub const KEYCHAINS_DIR: &str = "keychains";

fn lock_error(context: &str) -> KeychainError {
    KeychainError::StorageError(format!("FileStore: lock poisoned during {}", context))
}

/// File format for persistent storage
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: BTreeMap<String, StoredValue>,
}

/// Durable store persisted as a single JSON file
pub struct FileStore {
    path: PathBuf,
    cache: RwLock<BTreeMap<String, StoredValue>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing content if present
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = Self::load(&path)?;
        debug!("Opened file store at {:?} with {} entries", path, entries.len());

        Ok(Self {
            path,
            cache: RwLock::new(entries),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<BTreeMap<String, StoredValue>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(path)?;
        let file: StoreFile = serde_json::from_str(&contents)?;
        if file.version != FILE_VERSION {
            return Err(KeychainError::StorageError(format!(
                "Unsupported store file version {} in {:?}",
                file.version, path
            )));
        }
        Ok(file.entries)
    }

    fn save(&self, entries: &BTreeMap<String, StoredValue>) -> Result<()> {
        let file = StoreFile {
            version: FILE_VERSION,
            entries: entries.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;

        // Write atomically using a temp file
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &self.path)?;

        debug!("Saved {} entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        let cache = self.cache.read().map_err(|_| lock_error("get"))?;
        Ok(cache.get(key).cloned())
    }

    fn get_all(&self) -> Result<BTreeMap<String, StoredValue>> {
        let cache = self.cache.read().map_err(|_| lock_error("get_all"))?;
        Ok(cache.clone())
    }

    fn apply(&self, batch: StoreBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut cache = self.cache.write().map_err(|_| lock_error("apply"))?;
        let mut staged = cache.clone();
        batch.apply_to(&mut staged);
        self.save(&staged)?;
        *cache = staged;
        Ok(())
    }
}

/// Opens one [`FileStore`] per namespace inside a directory
pub struct FileStoreProvider {
    dir: PathBuf,
    stores: Mutex<HashMap<String, Arc<FileStore>>>,
}

impl FileStoreProvider {
    /// Create a provider storing namespaces under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Create a provider using the platform data directory
    pub fn with_default_dir() -> Result<Self> {
        Ok(Self::new(Self::default_dir()?.join(KEYCHAINS_DIR)))
    }

    /// Platform data directory of the application
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "symbia-labs", "secure-keychain")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                KeychainError::StorageError("Could not determine data directory".to_string())
            })
    }

    /// Directory holding the namespace files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing the given namespace
    ///
    /// The name is the lowercase hex of the identifier bytes, so distinct
    /// identifiers never share a file, even on case-insensitive file systems.
    pub fn file_path(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(identifier.as_bytes())))
    }
}

impl StoreProvider for FileStoreProvider {
    fn open(&self, identifier: &str) -> Result<Arc<dyn DurableStore>> {
        let mut stores = self.stores.lock().map_err(|_| lock_error("open"))?;
        if let Some(store) = stores.get(identifier) {
            let store: Arc<dyn DurableStore> = store.clone();
            return Ok(store);
        }

        let store = Arc::new(FileStore::open(self.file_path(identifier))?);
        stores.insert(identifier.to_string(), store.clone());
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_retrieve() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ns.json");
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());

        store.put("test-key", StoredValue::Text("test-value".to_string())).unwrap();

        assert_eq!(
            store.get("test-key").unwrap(),
            Some(StoredValue::Text("test-value".to_string()))
        );
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ns.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.put("flag", StoredValue::Boolean(true)).unwrap();
            store.put("count", StoredValue::Long(-303)).unwrap();
            store.put("ratio", StoredValue::Float(3.5)).unwrap();
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.get("flag").unwrap(), Some(StoredValue::Boolean(true)));
            assert_eq!(store.get("count").unwrap(), Some(StoredValue::Long(-303)));
            assert_eq!(store.get("ratio").unwrap(), Some(StoredValue::Float(3.5)));
        }
    }

    #[test]
    fn test_batch_is_applied_as_a_whole() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ns.json");
        let store = FileStore::open(&path).unwrap();
        store.put("stale", StoredValue::Int(1)).unwrap();

        let mut batch = StoreBatch::new();
        batch
            .clear()
            .put("a", StoredValue::Text("1".to_string()))
            .put("b", StoredValue::Text("2".to_string()));
        store.apply(batch).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        let entries = reopened.get_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!entries.contains_key("stale"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_failed_write_leaves_cache_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ns.json");
        let store = FileStore::open(&path).unwrap();
        store.put("kept", StoredValue::Long(1)).unwrap();

        // A directory in place of the temp file makes the staged write fail
        std::fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(store.put("lost", StoredValue::Long(2)).is_err());
        assert_eq!(store.get("lost").unwrap(), None);
        assert_eq!(store.get("kept").unwrap(), Some(StoredValue::Long(1)));
    }

    #[test]
    fn test_provider_file_names() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileStoreProvider::new(temp_dir.path());

        assert_eq!(provider.dir(), temp_dir.path());
        assert_eq!(
            provider.file_path("ns/a"),
            temp_dir.path().join("6e732f61.json")
        );
        assert_ne!(provider.file_path("com.example/app"), provider.file_path("com.example_app"));
        assert_ne!(provider.file_path("App"), provider.file_path("app"));
    }

    #[test]
    fn test_similar_identifiers_stay_isolated() {
        let temp_dir = TempDir::new().unwrap();

        {
            let provider = FileStoreProvider::new(temp_dir.path());
            provider.open("com.example/app").unwrap().put("a", StoredValue::Long(1)).unwrap();
            provider.open("com.example_app").unwrap().put("b", StoredValue::Long(2)).unwrap();
        }

        let provider = FileStoreProvider::new(temp_dir.path());
        let first = provider.open("com.example/app").unwrap();
        let second = provider.open("com.example_app").unwrap();
        assert_eq!(first.get("a").unwrap(), Some(StoredValue::Long(1)));
        assert_eq!(first.get("b").unwrap(), None);
        assert_eq!(second.get("b").unwrap(), Some(StoredValue::Long(2)));
        assert_eq!(second.get("a").unwrap(), None);
    }

    #[test]
    fn test_provider_caches_stores() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileStoreProvider::new(temp_dir.path());

        provider.open("ns").unwrap().put("k", StoredValue::Int(9)).unwrap();
        assert_eq!(provider.open("ns").unwrap().get("k").unwrap(), Some(StoredValue::Int(9)));
        assert!(provider.file_path("ns").exists());
    }
}
