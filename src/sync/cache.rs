use crate::error::SyncError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

/// Last-known catalog identity for one local file of an opaque format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub title: String,
    pub modified: DateTime<Utc>,
}

/// Persistent key → identity mapping for files that cannot self-report their
/// catalog identifier. Loaded once per run, pruned against the live file set,
/// and persisted atomically at the end.
#[derive(Debug)]
pub struct SideCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl SideCache {
    /// Load the cache, treating a missing file as empty. A file that exists
    /// but cannot be read or parsed is a fatal error, not an empty cache:
    /// silently discarding it would strand every tracked file as `Unknown`.
    pub fn load(path: PathBuf) -> Result<Self> {
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    entries: BTreeMap::new(),
                });
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context(SyncError::CacheUnreadable(path)));
            }
        };
        let entries = serde_json::from_str(&raw)
            .map_err(|err| anyhow::Error::new(err).context(SyncError::CacheUnreadable(path.clone())))?;
        Ok(Self { path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drop every entry whose key is not in `live`, returning how many were
    /// removed. Run near the end of a sync so files deleted mid-run (by this
    /// tool or manually) are also cleaned.
    pub fn prune(&mut self, live: &BTreeSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| live.contains(key));
        before.saturating_sub(self.entries.len())
    }

    /// Overwrite the persisted cache with the in-memory mapping via a temp
    /// file in the same directory plus rename. Callers skip this entirely
    /// under dry-run.
    pub fn save(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let data = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        tmp.write_all(format!("{data}\n").as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Default cache location: a user-scoped cache directory, distinct from the
/// synced collection.
pub fn default_cache_path() -> Result<PathBuf> {
    let base = dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("cache directory could not be resolved"))?;
    Ok(base.join("sebsync").join("cache.json"))
}
