//! CacheManager (spec §4.3), grounded on
//! `original_source/src/cache/manager.py`.

use std::future::Future;
use std::path::PathBuf;

use super::key::{generate_cache_key, CacheKeyInput};
use super::store::{CacheStats, CacheStore, DEFAULT_MAX_SIZE_MB};
use crate::provider::GatewayResponse;

pub const DEFAULT_TTL_HOURS: i64 = 24;

pub fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aigenflow")
        .join("cache")
}

pub struct CacheManager {
    store: CacheStore,
    default_ttl_hours: i64,
}

impl CacheManager {
    pub fn new(cache_dir: Option<PathBuf>, max_size_mb: u64, default_ttl_hours: i64) -> std::io::Result<Self> {
        let root = cache_dir.unwrap_or_else(default_cache_root);
        Ok(Self {
            store: CacheStore::new(root, max_size_mb)?,
            default_ttl_hours,
        })
    }

    pub fn with_defaults(cache_dir: Option<PathBuf>) -> std::io::Result<Self> {
        Self::new(cache_dir, DEFAULT_MAX_SIZE_MB, DEFAULT_TTL_HOURS)
    }

    pub fn key_for(&self, input: &CacheKeyInput) -> String {
        generate_cache_key(input)
    }

    pub fn get(&self, key: &str) -> Option<GatewayResponse> {
        self.store.get(key)
    }

    pub fn set(&self, key: &str, response: GatewayResponse, ttl_hours: Option<i64>) {
        self.store
            .save(key, response, ttl_hours.unwrap_or(self.default_ttl_hours));
    }

    pub fn invalidate(&self, key: &str) {
        self.store.delete(key);
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn clear(&self) -> u64 {
        self.store.clear()
    }

    pub fn list_entries(&self) -> Vec<String> {
        self.store.list().into_iter().map(|e| e.key).collect()
    }

    /// Return the cached payload on hit. On miss, await `compute`, store the
    /// result with the default TTL, and return it. Failed computations are
    /// never cached — `compute` itself decides what counts as a failure by
    /// returning an `Err`, in which case nothing is written to the store.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> anyhow::Result<GatewayResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<GatewayResponse>>,
    {
        if let Some(cached) = self.get(key) {
            return Ok(cached);
        }
        let response = compute().await?;
        self.set(key, response.clone(), None);
        Ok(response)
    }
}
