//! Key-value stores backing the render cache.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use thiserror::Error;

use crate::util::lock::{read_or_recover, write_or_recover};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Byte-oriented cache store with per-entry expiry.
///
/// No transactional guarantees: concurrent writers for one key race and the
/// last write wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn clear(&self) -> Result<(), StoreError>;
}

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// In-process store, bounded by entry count with LRU eviction.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryStore {
    pub fn new(max_entries: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(max_entries)),
        }
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        read_or_recover(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut entries = write_or_recover(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Unavailable(format!("ttl {ttl:?} overflows the clock")))?;
        write_or_recover(&self.entries, SOURCE, "set")
            .put(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        write_or_recover(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        write_or_recover(&self.entries, SOURCE, "clear").clear();
        Ok(())
    }
}

/// Named cache stores; backends pick theirs by `cache.alias`.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn CacheStore>>,
}

impl StoreRegistry {
    pub const DEFAULT_ALIAS: &'static str = "default";

    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `store` registered under [`Self::DEFAULT_ALIAS`].
    pub fn with_default(store: Arc<dyn CacheStore>) -> Self {
        let mut registry = Self::new();
        registry.register(Self::DEFAULT_ALIAS, store);
        registry
    }

    pub fn register(&mut self, alias: impl Into<String>, store: Arc<dyn CacheStore>) {
        self.stores.insert(alias.into(), store);
    }

    pub fn get(&self, alias: &str) -> Option<Arc<dyn CacheStore>> {
        self.stores.get(alias).cloned()
    }
}
