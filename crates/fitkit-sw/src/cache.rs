//! Named cache generations.
//!
//! `CacheStorage` is the plain data structure (the `caches` global);
//! `CacheStore` is the shared async handle every worker component holds.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::request::Response;
use crate::{Result, ServiceWorkerError};

// ==================== Cache Entry ====================

/// A stored request/response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request key (URL without fragment).
    pub url: String,

    /// Request method. Always GET.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body, owned by the cache.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response. The body is copied so the caller keeps its own.
    pub fn snapshot(key: &str, response: &Response) -> Self {
        Self {
            url: key.to_string(),
            method: "GET".to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone().into(),
        }
    }
}

// ==================== Cache ====================

/// A single named cache.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: HashMap<String, CacheEntry>,

    /// Optional entry quota.
    limit: Option<usize>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
            limit: None,
        }
    }

    /// Set or clear the entry quota.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Exact key lookup.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store a response. Returns `false` when the response is not cacheable.
    ///
    /// An existing entry for the same key is replaced.
    pub fn put(&mut self, key: &str, response: &Response) -> Result<bool> {
        if !response.is_cacheable() {
            trace!(cache = %self.name, key, status = response.status, "Skipping uncacheable response");
            return Ok(false);
        }

        if let Some(limit) = self.limit {
            if !self.entries.contains_key(key) && self.entries.len() >= limit {
                return Err(ServiceWorkerError::QuotaExceeded {
                    cache: self.name.clone(),
                    limit,
                });
            }
        }

        self.entries
            .insert(key.to_string(), CacheEntry::snapshot(key, response));
        Ok(true)
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Every named cache, in creation order.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: Vec<Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        let index = match self.caches.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                debug!(cache = name, "Creating cache");
                self.caches.push(Cache::new(name));
                self.caches.len() - 1
            }
        };
        &mut self.caches[index]
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.iter().find(|c| c.name == name)
    }

    /// Insert a fully built cache, replacing any cache with the same name.
    pub fn insert(&mut self, cache: Cache) {
        match self.caches.iter_mut().find(|c| c.name == cache.name) {
            Some(existing) => *existing = cache,
            None => self.caches.push(cache),
        }
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.caches.len();
        self.caches.retain(|c| c.name != name);
        self.caches.len() != before
    }

    /// Get all cache names, in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.caches.iter().map(|c| c.name.clone()).collect()
    }

    /// Match across all caches, oldest cache first.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.caches.iter().find_map(|c| c.match_request(key))
    }
}

// ==================== Cache Store ====================

/// Shared, async handle to the cache storage.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    inner: Arc<RwLock<CacheStorage>>,
}

impl CacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a named generation.
    pub async fn open(&self, name: &str) -> CacheHandle {
        self.inner.write().await.open(name);
        CacheHandle {
            name: name.to_string(),
            limit: None,
            store: self.clone(),
        }
    }

    /// Match a key across every generation.
    pub async fn match_request(&self, key: &str) -> Option<Response> {
        self.inner
            .read()
            .await
            .match_request(key)
            .map(CacheEntry::to_response)
    }

    /// Whether a generation exists.
    pub async fn has(&self, name: &str) -> bool {
        self.inner.read().await.has(name)
    }

    /// Delete a generation.
    pub async fn delete(&self, name: &str) -> bool {
        self.inner.write().await.delete(name)
    }

    /// List generation names.
    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.keys()
    }

    /// Keys stored in one generation (empty if it doesn't exist).
    pub async fn entry_keys(&self, name: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .get(name)
            .map(Cache::keys)
            .unwrap_or_default()
    }

    /// Publish a fully built generation in one step.
    pub async fn insert(&self, cache: Cache) {
        self.inner.write().await.insert(cache);
    }
}

/// An opened generation.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    name: String,
    limit: Option<usize>,
    store: CacheStore,
}

impl CacheHandle {
    /// Generation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply an entry quota to writes made through this handle.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Store a deep copy of `response` under `key`.
    ///
    /// Recreates the generation if it was deleted since it was opened.
    pub async fn put(&self, key: &str, response: &Response) -> Result<bool> {
        let mut storage = self.store.inner.write().await;
        let cache = storage.open(&self.name);
        if self.limit.is_some() {
            cache.set_limit(self.limit);
        }
        cache.put(key, response)
    }

    /// Exact key lookup in this generation only.
    pub async fn match_request(&self, key: &str) -> Option<Response> {
        self.store
            .inner
            .read()
            .await
            .get(&self.name)
            .and_then(|c| c.match_request(key))
            .map(CacheEntry::to_response)
    }

    /// Delete one entry.
    pub async fn delete(&self, key: &str) -> bool {
        let mut storage = self.store.inner.write().await;
        match storage.caches.iter_mut().find(|c| c.name == self.name) {
            Some(cache) => cache.delete(key),
            None => false,
        }
    }

    /// Write in the background. Failures are logged, never returned.
    pub fn spawn_put(&self, key: String, response: Response) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            match handle.put(&key, &response).await {
                Ok(true) => trace!(cache = %handle.name, key = %key, "Cached response"),
                Ok(false) => {}
                Err(e) => warn!(cache = %handle.name, key = %key, error = %e, "Cache write failed"),
            }
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
