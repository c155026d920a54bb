//! In-process cache, used by tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CacheError, CacheMeta, OptimizationCache};

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, CacheMeta)>>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without counting it as a store.
    pub fn insert(&self, key: &str, data: &[u8], meta: CacheMeta) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (data.to_vec(), meta));
        }
    }

    /// Raw entry regardless of metadata.
    pub fn get(&self, key: &str) -> Option<(Vec<u8>, CacheMeta)> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OptimizationCache for MemoryCache {
    async fn fetch(&self, key: &str, meta: &CacheMeta) -> Result<Option<Vec<u8>>, CacheError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(entries
            .get(key)
            .filter(|(_, stored)| stored == meta)
            .map(|(data, _)| data.clone()))
    }

    async fn store(&self, key: &str, data: &[u8], meta: &CacheMeta) -> Result<(), CacheError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        entries.insert(key.to_string(), (data.to_vec(), meta.clone()));
        Ok(())
    }
}
