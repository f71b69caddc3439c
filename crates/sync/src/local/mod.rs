// Local cache tier: the fast, best-effort copy of every open document.
//
// Entries are full serialized documents keyed by `document-<id>`. The cache is
// a resilience aid, never the source of truth for whether a document exists.

mod sqlite;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use folio_common::normalize::normalize;
use folio_common::Document;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub use sqlite::SqliteCache;

/// Prefix for local cache keys.
pub const CACHE_KEY_PREFIX: &str = "document-";

pub fn cache_key(id: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{id}")
}

// ── Cache trait ─────────────────────────────────────────────────────

/// Key-value store holding serialized documents. No transactional guarantees
/// are assumed.
pub trait LocalCache: Send + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, LocalCacheError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalCacheError>;
    fn remove(&mut self, key: &str) -> Result<(), LocalCacheError>;
}

#[derive(Debug, Error)]
pub enum LocalCacheError {
    #[error("cached document is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("local cache unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

// ── In-memory cache ─────────────────────────────────────────────────

/// Process-local cache. Clones share storage, so a test can keep one clone
/// while a session owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `set` calls fail (simulates a full or locked store).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().is_ok_and(|entries| entries.contains_key(key))
    }

    /// Decode the cached document for `id`, if any.
    pub fn document(&self, id: &str) -> Option<Document> {
        let raw = self.get(&cache_key(id)).ok().flatten()?;
        serde_json::from_str::<Value>(&raw).ok().map(|value| normalize(&value))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, LocalCacheError> {
        self.entries
            .lock()
            .map_err(|_| LocalCacheError::Unavailable("memory cache lock poisoned".into()))
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, LocalCacheError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalCacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LocalCacheError::Unavailable("writes disabled".into()));
        }
        self.lock()?.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), LocalCacheError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

// ── Local writer ────────────────────────────────────────────────────

/// The only component that writes the local cache.
#[derive(Debug)]
pub struct LocalWriter<C> {
    cache: C,
    saves: u64,
}

impl<C: LocalCache> LocalWriter<C> {
    pub fn new(cache: C) -> Self {
        Self { cache, saves: 0 }
    }

    /// Persist the full document. Failures are logged and swallowed; returns
    /// whether the write landed.
    pub fn write(&mut self, doc: &Document) -> bool {
        match self.try_write(doc) {
            Ok(()) => {
                self.saves += 1;
                debug!(doc_id = %doc.id, saves = self.saves, "local save");
                true
            }
            Err(e) => {
                warn!(doc_id = %doc.id, error = %e, "local save failed");
                false
            }
        }
    }

    pub fn try_write(&mut self, doc: &Document) -> Result<(), LocalCacheError> {
        let body = serde_json::to_string(doc)?;
        self.cache.set(&cache_key(&doc.id), &body)
    }

    /// Read and normalize the cached copy of `id`.
    pub fn read(&self, id: &str) -> Result<Option<Document>, LocalCacheError> {
        read_cached(&self.cache, id)
    }

    pub fn remove(&mut self, id: &str) -> Result<(), LocalCacheError> {
        self.cache.remove(&cache_key(id))
    }

    /// Successful local saves so far.
    pub fn saves(&self) -> u64 {
        self.saves
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn into_inner(self) -> C {
        self.cache
    }
}

/// Read and normalize the cached copy of `id` from any cache.
pub fn read_cached<C: LocalCache + ?Sized>(
    cache: &C,
    id: &str,
) -> Result<Option<Document>, LocalCacheError> {
    match cache.get(&cache_key(id))? {
        Some(raw) => {
            let value: Value = serde_json::from_str(&raw)?;
            Ok(Some(normalize(&value)))
        }
        None => Ok(None),
    }
}
