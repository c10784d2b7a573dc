//! Cache Store Module
//!
//! Versioned request→response storage. Entries live in named generations;
//! eviction happens only by deleting a whole generation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::generation::validate_generation_id;
use crate::cache::{
    CacheEntry, CacheStats, CachedResponse, DiskStore, Generation, LookupCounters, MatchOptions,
    RequestKey,
};
use crate::error::{Result, WorkerError};

/// Store handle shared between the worker's handlers.
pub type SharedStore = Arc<RwLock<CacheStore>>;

/// Per-generation summary for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub id: String,
    pub entries: usize,
    pub manifest_len: usize,
    pub current: bool,
}

// == Cache Store ==
/// Generation-keyed cache storage with optional write-through to disk.
#[derive(Debug)]
pub struct CacheStore {
    /// Generations by id
    generations: HashMap<String, Generation>,
    /// The generation served by default
    current: Option<String>,
    /// Disk persistence, None for an in-memory store
    disk: Option<DiskStore>,
    /// Write-side counters and sizes
    stats: CacheStats,
    /// Hit/miss counters, updated under a read lock
    lookups: LookupCounters,
}

impl CacheStore {
    // == Constructors ==
    /// Creates an empty store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            generations: HashMap::new(),
            current: None,
            disk: None,
            stats: CacheStats::new(),
            lookups: LookupCounters::default(),
        }
    }

    /// Opens a durable store rooted at `root`, reloading anything already there.
    pub fn open_dir(root: impl Into<PathBuf>) -> Result<Self> {
        let disk = DiskStore::new(root)?;
        let loaded = disk.load()?;
        info!(
            "Opened cache storage at {} ({} generations, current: {})",
            disk.root().display(),
            loaded.generations.len(),
            loaded.current.as_deref().unwrap_or("none")
        );

        let mut store = Self {
            generations: loaded.generations,
            current: loaded.current,
            disk: Some(disk),
            stats: CacheStats::new(),
            lookups: LookupCounters::default(),
        };
        store.refresh_sizes();
        Ok(store)
    }

    /// Wraps the store for sharing across tasks.
    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn is_persistent(&self) -> bool {
        self.disk.is_some()
    }

    // == Create ==
    /// Creates generation `id` for `manifest`, keeping entries if it already exists.
    pub fn create(&mut self, id: &str, manifest: Vec<String>) -> Result<()> {
        validate_generation_id(id)?;

        let mut generation = self
            .generations
            .remove(id)
            .unwrap_or_else(|| Generation::new(id, Vec::new()));
        generation.manifest = manifest;

        if let Some(disk) = &self.disk {
            if let Err(err) = disk.create_generation(&generation) {
                self.generations.insert(id.to_string(), generation);
                return Err(err);
            }
        }

        debug!("Created generation '{}'", id);
        self.generations.insert(id.to_string(), generation);
        self.refresh_sizes();
        Ok(())
    }

    // == Open ==
    /// Opens an existing generation for writing.
    ///
    /// Fails with `NotFound` if it does not exist and with `Storage` if its
    /// backing directory cannot be opened.
    pub fn open(&self, id: &str) -> Result<&Generation> {
        let generation = self
            .generations
            .get(id)
            .ok_or_else(|| WorkerError::NotFound(format!("generation '{}'", id)))?;

        if let Some(disk) = &self.disk {
            let dir = disk.root().join(id);
            std::fs::create_dir_all(&dir)?;
        }
        Ok(generation)
    }

    // == Put ==
    /// Stores `response` under `key` in generation `id`, overwriting unconditionally.
    pub fn put(&mut self, id: &str, key: RequestKey, response: CachedResponse) -> Result<()> {
        let generation = self
            .generations
            .get_mut(id)
            .ok_or_else(|| WorkerError::NotFound(format!("generation '{}'", id)))?;

        let entry = CacheEntry::new(key, response);
        if let Some(disk) = &self.disk {
            disk.write_entry(id, &entry)?;
        }

        debug!("Stored {} in '{}'", entry.key, id);
        generation.insert(entry);
        self.stats.record_put();
        self.refresh_sizes();
        Ok(())
    }

    // == Match ==
    /// Looks up `key` in generation `id`, recording a hit or miss.
    pub fn match_request(
        &self,
        id: &str,
        key: &RequestKey,
        options: MatchOptions,
    ) -> Option<CachedResponse> {
        let found = self
            .generations
            .get(id)
            .and_then(|generation| generation.find(key, options))
            .map(|entry| entry.response.clone());

        self.lookups.record(found.is_some());
        found
    }

    /// Looks up an entry without touching the statistics.
    pub fn peek(&self, id: &str, key: &RequestKey) -> Option<&CacheEntry> {
        self.generations
            .get(id)
            .and_then(|generation| generation.find(key, MatchOptions::default()))
    }

    // == Delete ==
    /// Removes generation `id` and all its entries. Returns whether it existed.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        if let Some(disk) = &self.disk {
            disk.remove_generation(id)?;
        }

        let existed = self.generations.remove(id).is_some();
        if existed {
            self.stats.record_eviction();
            info!("Deleted generation '{}'", id);
        }

        if self.current.as_deref() == Some(id) {
            self.current = None;
            if let Some(disk) = &self.disk {
                disk.write_current(None)?;
            }
        }

        self.refresh_sizes();
        Ok(existed)
    }

    // == Generations ==
    /// Returns all known generation ids, sorted.
    pub fn list_generations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.generations.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn generation(&self, id: &str) -> Option<&Generation> {
        self.generations.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.generations.contains_key(id)
    }

    /// The current generation id, if one has been activated.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Marks generation `id` as current.
    pub fn set_current(&mut self, id: &str) -> Result<()> {
        if !self.generations.contains_key(id) {
            return Err(WorkerError::NotFound(format!("generation '{}'", id)));
        }
        if let Some(disk) = &self.disk {
            disk.write_current(Some(id))?;
        }
        self.current = Some(id.to_string());
        Ok(())
    }

    /// Keys stored in generation `id`, in order.
    pub fn keys(&self, id: &str) -> Vec<RequestKey> {
        self.generations
            .get(id)
            .map(Generation::keys)
            .unwrap_or_default()
    }

    /// Manifest recorded for generation `id`.
    pub fn manifest(&self, id: &str) -> Option<&[String]> {
        self.generations.get(id).map(|g| g.manifest.as_slice())
    }

    pub fn summaries(&self) -> Vec<GenerationSummary> {
        self.list_generations()
            .into_iter()
            .filter_map(|id| {
                self.generations.get(&id).map(|g| GenerationSummary {
                    current: self.current.as_deref() == Some(id.as_str()),
                    entries: g.len(),
                    manifest_len: g.manifest.len(),
                    id,
                })
            })
            .collect()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        self.lookups.fill(&mut stats);
        stats
    }

    // == Length ==
    /// Returns the number of entries across all generations.
    pub fn len(&self) -> usize {
        self.generations.values().map(Generation::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn refresh_sizes(&mut self) {
        let total = self.len();
        self.stats.set_sizes(total, self.generations.len());
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(path: &str) -> RequestKey {
        RequestKey::parse_get(&format!("https://app.example{}", path)).unwrap()
    }

    #[test]
    fn test_store_new() {
        let store = CacheStore::in_memory();
        assert!(store.is_empty());
        assert!(store.current().is_none());
        assert!(store.list_generations().is_empty());
        assert!(!store.is_persistent());
    }

    #[test]
    fn test_store_put_and_match() {
        let mut store = CacheStore::in_memory();
        store.create("v1", Vec::new()).unwrap();

        store
            .put("v1", key("/data.json"), CachedResponse::ok(r#"{"x":1}"#))
            .unwrap();
        let response = store
            .match_request("v1", &key("/data.json"), MatchOptions::default())
            .unwrap();

        assert_eq!(response.body, br#"{"x":1}"#);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_put_requires_generation() {
        let mut store = CacheStore::in_memory();

        let result = store.put("missing", key("/a.js"), CachedResponse::ok("a"));
        assert!(matches!(result, Err(WorkerError::NotFound(_))));
    }

    #[test]
    fn test_store_match_other_generation_misses() {
        let mut store = CacheStore::in_memory();
        store.create("v1", Vec::new()).unwrap();
        store.create("v2", Vec::new()).unwrap();
        store.put("v1", key("/a.js"), CachedResponse::ok("a")).unwrap();

        assert!(store
            .match_request("v2", &key("/a.js"), MatchOptions::default())
            .is_none());
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = CacheStore::in_memory();
        store.create("v1", Vec::new()).unwrap();

        store.put("v1", key("/a.js"), CachedResponse::ok("old")).unwrap();
        store.put("v1", key("/a.js"), CachedResponse::ok("new")).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.peek("v1", &key("/a.js")).unwrap().response.body, b"new");
    }

    #[test]
    fn test_store_delete_generation() {
        let mut store = CacheStore::in_memory();
        store.create("v1", Vec::new()).unwrap();
        store.put("v1", key("/a.js"), CachedResponse::ok("a")).unwrap();
        store.set_current("v1").unwrap();

        assert!(store.delete("v1").unwrap());
        assert!(!store.delete("v1").unwrap());
        assert!(store.is_empty());
        assert!(store.current().is_none());
        assert_eq!(store.stats().evicted_generations, 1);
    }

    #[test]
    fn test_store_list_generations_sorted() {
        let mut store = CacheStore::in_memory();
        store.create("shell-v2", Vec::new()).unwrap();
        store.create("shell-v1", Vec::new()).unwrap();

        assert_eq!(store.list_generations(), vec!["shell-v1", "shell-v2"]);
    }

    #[test]
    fn test_store_set_current_requires_generation() {
        let mut store = CacheStore::in_memory();

        assert!(matches!(
            store.set_current("nope"),
            Err(WorkerError::NotFound(_))
        ));
    }

    #[test]
    fn test_store_create_keeps_entries() {
        let mut store = CacheStore::in_memory();
        store.create("v1", vec!["a".to_string()]).unwrap();
        store.put("v1", key("/a.js"), CachedResponse::ok("a")).unwrap();

        store.create("v1", vec!["a".to_string(), "b".to_string()]).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.manifest("v1").unwrap().len(), 2);
    }

    #[test]
    fn test_store_rejects_bad_generation_id() {
        let mut store = CacheStore::in_memory();

        let result = store.create("../escape", Vec::new());
        assert!(matches!(result, Err(WorkerError::InvalidRequest(_))));
    }

    #[test]
    fn test_store_stats() {
        let mut store = CacheStore::in_memory();
        store.create("v1", Vec::new()).unwrap();
        store.put("v1", key("/a.js"), CachedResponse::ok("a")).unwrap();

        store.match_request("v1", &key("/a.js"), MatchOptions::default()); // hit
        store.match_request("v1", &key("/b.js"), MatchOptions::default()); // miss

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.generations, 1);
    }

    #[test]
    fn test_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CacheStore::open_dir(dir.path()).unwrap();
            store.create("shell-v1", vec!["https://app.example/a.js".to_string()]).unwrap();
            store.put("shell-v1", key("/a.js"), CachedResponse::ok("a")).unwrap();
            store.set_current("shell-v1").unwrap();
        }

        let mut reopened = CacheStore::open_dir(dir.path()).unwrap();
        assert!(reopened.is_persistent());
        assert_eq!(reopened.current(), Some("shell-v1"));
        assert_eq!(
            reopened.manifest("shell-v1").unwrap(),
            &["https://app.example/a.js".to_string()]
        );
        let response = reopened
            .match_request("shell-v1", &key("/a.js"), MatchOptions::default())
            .unwrap();
        assert_eq!(response.body, b"a");
    }

    #[test]
    fn test_store_delete_removes_from_disk() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CacheStore::open_dir(dir.path()).unwrap();
            store.create("shell-v1", Vec::new()).unwrap();
            store.put("shell-v1", key("/a.js"), CachedResponse::ok("a")).unwrap();
            store.delete("shell-v1").unwrap();
        }

        let reopened = CacheStore::open_dir(dir.path()).unwrap();
        assert!(reopened.list_generations().is_empty());
    }
}
