//! Cross-run section content cache.
//!
//! Sled-backed, keyed by `blake3("section|title|instruction|min_chars")`. Entries expire
//! after a TTL on read; when the store grows past its bound the least valuable tenth (by
//! hit count, then last hit) is evicted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CacheSettings;
use crate::error::StorageError;
use crate::text::body_len;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub text: String,
    pub created_at_ms: i64,
    pub last_hit_ms: i64,
    pub hits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub size_on_disk: u64,
    pub path: Option<PathBuf>,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

/// Hex cache key for a section request.
pub fn cache_key(title: &str, instruction: &str, min_chars: usize) -> String {
    let raw = format!("section|{}|{}|{}", title, instruction, min_chars);
    hex::encode(blake3::hash(raw.as_bytes()).as_bytes())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn encode(entry: &CacheEntry) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(entry)
        .map_err(|e| StorageError::Encoding(format!("Failed to serialize cache entry: {}", e)))
}

fn decode(bytes: &[u8]) -> Result<CacheEntry, StorageError> {
    bincode::deserialize(bytes)
        .map_err(|e| StorageError::Encoding(format!("Failed to deserialize cache entry: {}", e)))
}

pub struct ContentCache {
    db: sled::Db,
    path: Option<PathBuf>,
    ttl: Duration,
    max_entries: usize,
    min_cacheable_chars: usize,
}

impl ContentCache {
    /// Open (or create) the cache database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, settings: &CacheSettings) -> Result<Self, StorageError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)
            .map_err(|e| StorageError::Database(format!("Failed to open cache database: {}", e)))?;
        Ok(Self::with_db(db, Some(path.to_path_buf()), settings))
    }

    /// An in-memory store removed on drop.
    pub fn temporary(settings: &CacheSettings) -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::with_db(db, None, settings))
    }

    fn with_db(db: sled::Db, path: Option<PathBuf>, settings: &CacheSettings) -> Self {
        Self {
            db,
            path,
            ttl: Duration::from_secs(settings.ttl_secs),
            max_entries: settings.max_entries.max(1),
            min_cacheable_chars: settings.min_cacheable_chars,
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        let ttl_ms = self.ttl.as_millis() as i64;
        ttl_ms > 0 && now.saturating_sub(entry.created_at_ms) > ttl_ms
    }

    /// Look up a section. A hit bumps the entry's hit count; an expired entry is removed.
    pub fn get(&self, title: &str, instruction: &str, min_chars: usize) -> Result<Option<String>, StorageError> {
        let key = cache_key(title, instruction, min_chars);
        let Some(bytes) = self.db.get(key.as_bytes())? else {
            return Ok(None);
        };
        let mut entry = decode(&bytes)?;
        let now = now_ms();
        if self.is_expired(&entry, now) {
            self.db.remove(key.as_bytes())?;
            debug!(section = title, "Cache entry expired");
            return Ok(None);
        }
        entry.hits += 1;
        entry.last_hit_ms = now;
        self.db.insert(key.as_bytes(), encode(&entry)?)?;
        Ok(Some(entry.text))
    }

    /// Store a section. Returns `false` when the text is too short to be worth caching.
    pub fn put(&self, title: &str, instruction: &str, min_chars: usize, text: &str) -> Result<bool, StorageError> {
        if body_len(text) <= self.min_cacheable_chars {
            return Ok(false);
        }
        let now = now_ms();
        let entry = CacheEntry {
            text: text.to_string(),
            created_at_ms: now,
            last_hit_ms: now,
            hits: 0,
        };
        self.insert_entry(&cache_key(title, instruction, min_chars), &entry)?;
        self.evict_if_needed()?;
        Ok(true)
    }

    fn insert_entry(&self, key: &str, entry: &CacheEntry) -> Result<(), StorageError> {
        self.db.insert(key.as_bytes(), encode(entry)?)?;
        Ok(())
    }

    fn evict_if_needed(&self) -> Result<usize, StorageError> {
        let len = self.db.len();
        if len <= self.max_entries {
            return Ok(0);
        }
        let mut scored = Vec::with_capacity(len);
        for item in self.db.iter() {
            let (key, value) = item?;
            match decode(&value) {
                Ok(entry) => scored.push((entry.hits, entry.last_hit_ms, key)),
                // Undecodable entries go first.
                Err(_) => scored.push((0, i64::MIN, key)),
            }
        }
        scored.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let excess = len - self.max_entries;
        let tenth = len.div_ceil(10);
        let evict = excess.max(tenth);
        for (_, _, key) in scored.iter().take(evict) {
            self.db.remove(key)?;
        }
        info!(evicted = evict, remaining = len - evict, "Evicted section cache entries");
        Ok(evict)
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    pub fn stats(&self) -> Result<CacheStats, StorageError> {
        Ok(CacheStats {
            entries: self.db.len(),
            size_on_disk: self.db.size_on_disk()?,
            path: self.path.clone(),
            max_entries: self.max_entries,
            ttl_secs: self.ttl.as_secs(),
        })
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> Result<usize, StorageError> {
        let count = self.db.len();
        self.db.clear()?;
        self.db.flush()?;
        Ok(count)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
