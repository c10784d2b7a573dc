//! Disk Persistence Module
//!
//! Writes generations through to a directory so the cache survives restarts.
//!
//! # Layout
//! ```text
//! <root>/CURRENT                      current generation id
//! <root>/<generation>/manifest.json   precache manifest
//! <root>/<generation>/<digest>.json   entry metadata
//! <root>/<generation>/<digest>.body   entry body
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::generation::validate_generation_id;
use crate::cache::{CacheEntry, CachedResponse, Generation, RequestKey};
use crate::error::Result;

const CURRENT_FILE: &str = "CURRENT";
const MANIFEST_FILE: &str = "manifest.json";
const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

/// Entry metadata as written next to its body.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    method: String,
    url: String,
    status: u16,
    headers: BTreeMap<String, String>,
    cached_at: DateTime<Utc>,
}

/// Everything recovered from disk on startup.
#[derive(Debug, Default)]
pub struct LoadedState {
    pub generations: HashMap<String, Generation>,
    pub current: Option<String>,
}

// == Disk Store ==
/// Write-through persistence for the cache store.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Opens (creating if needed) the storage root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    // == Writes ==
    /// Creates the generation directory and records its manifest.
    pub fn create_generation(&self, generation: &Generation) -> Result<()> {
        let dir = self.generation_dir(&generation.id);
        fs::create_dir_all(&dir)?;
        let manifest = serde_json::to_vec_pretty(&generation.manifest)?;
        write_atomic(&dir.join(MANIFEST_FILE), &manifest)
    }

    /// Writes one entry; the metadata file is written last and marks it complete.
    pub fn write_entry(&self, generation_id: &str, entry: &CacheEntry) -> Result<()> {
        let dir = self.generation_dir(generation_id);
        let digest = entry.key.digest();

        write_atomic(
            &dir.join(format!("{}.{}", digest, BODY_EXT)),
            &entry.response.body,
        )?;

        let meta = PersistedEntry {
            method: entry.key.method.clone(),
            url: entry.key.url.clone(),
            status: entry.response.status,
            headers: entry.response.headers.clone(),
            cached_at: entry.cached_at,
        };
        write_atomic(
            &dir.join(format!("{}.{}", digest, META_EXT)),
            &serde_json::to_vec_pretty(&meta)?,
        )
    }

    /// Removes a generation directory and everything in it.
    pub fn remove_generation(&self, id: &str) -> Result<()> {
        let dir = self.generation_dir(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Records (or clears) the current generation marker.
    pub fn write_current(&self, id: Option<&str>) -> Result<()> {
        let path = self.root.join(CURRENT_FILE);
        match id {
            Some(id) => write_atomic(&path, id.as_bytes()),
            None => {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                Ok(())
            }
        }
    }

    // == Load ==
    /// Reads every generation and the current marker from disk.
    ///
    /// Unreadable entries and directories with invalid names are skipped.
    pub fn load(&self) -> Result<LoadedState> {
        let mut state = LoadedState::default();

        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if let Err(err) = validate_generation_id(&name) {
                warn!("Skipping cache directory '{}': {}", name, err);
                continue;
            }

            let generation = self.load_generation(&name, &dir_entry.path())?;
            debug!(
                "Loaded generation '{}' with {} entries",
                name,
                generation.len()
            );
            state.generations.insert(name, generation);
        }

        let current_path = self.root.join(CURRENT_FILE);
        if current_path.exists() {
            let id = fs::read_to_string(&current_path)?.trim().to_string();
            if state.generations.contains_key(&id) {
                state.current = Some(id);
            } else {
                warn!("Current generation '{}' has no stored entries", id);
            }
        }

        Ok(state)
    }

    fn load_generation(&self, id: &str, dir: &Path) -> Result<Generation> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest: Vec<String> = if manifest_path.exists() {
            serde_json::from_slice(&fs::read(&manifest_path)?)?
        } else {
            Vec::new()
        };

        let mut generation = Generation::new(id, manifest);

        for file in fs::read_dir(dir)? {
            let path = file?.path();
            let is_meta = path.extension().and_then(|e| e.to_str()) == Some(META_EXT);
            if !is_meta || path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE) {
                continue;
            }
            match read_entry(&path) {
                Ok(entry) => generation.insert(entry),
                Err(err) => warn!("Skipping unreadable cache entry {}: {}", path.display(), err),
            }
        }

        Ok(generation)
    }
}

fn read_entry(meta_path: &Path) -> Result<CacheEntry> {
    let meta: PersistedEntry = serde_json::from_slice(&fs::read(meta_path)?)?;
    let body = fs::read(meta_path.with_extension(BODY_EXT))?;

    Ok(CacheEntry {
        key: RequestKey {
            method: meta.method,
            url: meta.url,
        },
        response: CachedResponse {
            status: meta.status,
            headers: meta.headers,
            body,
        },
        cached_at: meta.cached_at,
    })
}

/// Writes to a sibling temp file and renames it into place.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
