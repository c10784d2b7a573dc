//! Cache Generation Module
//!
//! A generation is one versioned set of cached entries, named by its id.

use std::collections::BTreeMap;

use crate::cache::{CacheEntry, CachedResponse, RequestKey, MAX_GENERATION_ID_LENGTH};
use crate::error::{Result, WorkerError};

// == Match Options ==
/// Options for looking up a request in a generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Treat `/path?x=1` and `/path?x=2` as the same asset
    pub ignore_query: bool,
}

// == Generation ==
/// A named set of entries representing one version of the app shell.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Generation id, e.g. `app-shell-v1.0.0`
    pub id: String,
    /// Precache manifest the generation was created for
    pub manifest: Vec<String>,
    /// Entries keyed by request identity, at most one per key
    entries: BTreeMap<RequestKey, CacheEntry>,
}

impl Generation {
    /// Creates an empty generation.
    pub fn new(id: impl Into<String>, manifest: Vec<String>) -> Self {
        Self {
            id: id.into(),
            manifest,
            entries: BTreeMap::new(),
        }
    }

    /// Stores `response` under `key`, replacing any existing entry.
    pub fn put(&mut self, key: RequestKey, response: CachedResponse) -> &CacheEntry {
        let entry = CacheEntry::new(key.clone(), response);
        self.entries.insert(key.clone(), entry);
        &self.entries[&key]
    }

    /// Inserts a prepared entry without re-stamping it.
    pub(crate) fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Finds the entry for `key`.
    ///
    /// With `ignore_query` the exact key is tried first, then the first entry
    /// whose method and query-stripped URL match.
    pub fn find(&self, key: &RequestKey, options: MatchOptions) -> Option<&CacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Some(entry);
        }
        if !options.ignore_query {
            return None;
        }

        let wanted = key.without_query();
        self.entries
            .values()
            .find(|entry| entry.key.without_query() == wanted)
    }

    /// All keys in order.
    pub fn keys(&self) -> Vec<RequestKey> {
        self.entries.keys().cloned().collect()
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Id Validation ==
/// Checks that a generation id is usable as a directory name.
pub fn validate_generation_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_GENERATION_ID_LENGTH {
        return Err(WorkerError::InvalidRequest(format!(
            "Generation id must be 1 to {} characters",
            MAX_GENERATION_ID_LENGTH
        )));
    }
    if id == "." || id == ".." {
        return Err(WorkerError::InvalidRequest(format!(
            "Generation id '{}' is reserved",
            id
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(WorkerError::InvalidRequest(format!(
            "Generation id '{}' may only contain letters, digits, '.', '_' and '-'",
            id
        )));
    }
    Ok(())
}
