//! CacheStore (spec §4.2), grounded on `original_source/src/cache/storage.py`.
//! Writes are atomic (write-temp-then-rename) per spec §5's no-torn-writes
//! guarantee, following the general atomic-write idiom used for the teacher's
//! own on-disk artifacts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::logging::log_debug;
use crate::provider::GatewayResponse;

pub const DEFAULT_MAX_SIZE_MB: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub response: GatewayResponse,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub total_entries: u64,
    pub total_size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }

    fn update_hit_rate(&mut self) {
        let total = self.hit_count + self.miss_count;
        if total > 0 {
            self.hit_rate = self.hit_count as f64 / total as f64;
        }
    }
}

pub struct CacheStore {
    responses_dir: PathBuf,
    stats_file: PathBuf,
    max_size_bytes: u64,
    stats: Mutex<CacheStats>,
}

fn entry_path(responses_dir: &Path, key: &str) -> PathBuf {
    responses_dir.join(format!("{key}.json"))
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}

impl CacheStore {
    pub fn new(root: impl AsRef<Path>, max_size_mb: u64) -> std::io::Result<Self> {
        let root = root.as_ref();
        let responses_dir = root.join("responses");
        fs::create_dir_all(&responses_dir)?;
        let stats_file = root.join("stats.json");
        let stats = Self::load_stats(&stats_file);
        Ok(Self {
            responses_dir,
            stats_file,
            max_size_bytes: max_size_mb * 1024 * 1024,
            stats: Mutex::new(stats),
        })
    }

    fn load_stats(stats_file: &Path) -> CacheStats {
        fs::read(stats_file)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn save_stats(&self) {
        let stats = self.stats.lock().unwrap();
        if let Ok(bytes) = serde_json::to_vec(&*stats) {
            // A failed stats write must never surface to callers (spec §4.2).
            let _ = write_atomic(&self.stats_file, &bytes);
        }
    }

    fn entry_size(entry: &CacheEntry) -> u64 {
        serde_json::to_vec(entry).map(|b| b.len() as u64).unwrap_or(0)
    }

    pub fn save(&self, key: &str, response: GatewayResponse, ttl_hours: i64) {
        let now = Utc::now();
        let mut entry = CacheEntry {
            key: key.to_string(),
            response,
            created_at: now,
            expires_at: now + ChronoDuration::hours(ttl_hours),
            access_count: 0,
            last_accessed: None,
            size_bytes: 0,
        };
        entry.size_bytes = Self::entry_size(&entry);

        let path = entry_path(&self.responses_dir, key);
        if let Ok(bytes) = serde_json::to_vec(&entry) {
            if write_atomic(&path, &bytes).is_ok() {
                let mut stats = self.stats.lock().unwrap();
                stats.total_entries += 1;
                stats.total_size_bytes += entry.size_bytes;
            }
        }
        self.save_stats();
        self.evict_if_needed();
    }

    pub fn get(&self, key: &str) -> Option<GatewayResponse> {
        let path = entry_path(&self.responses_dir, key);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(_) => {
                self.record_miss();
                return None;
            }
        };

        let mut entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(_) => {
                self.delete(key);
                self.record_miss();
                return None;
            }
        };

        if Utc::now() > entry.expires_at {
            self.delete(key);
            self.record_miss();
            return None;
        }

        entry.access_count += 1;
        entry.last_accessed = Some(Utc::now());
        if let Ok(bytes) = serde_json::to_vec(&entry) {
            let _ = write_atomic(&path, &bytes);
        }

        {
            let mut stats = self.stats.lock().unwrap();
            stats.hit_count += 1;
            stats.update_hit_rate();
        }
        self.save_stats();

        Some(entry.response)
    }

    fn record_miss(&self) {
        {
            let mut stats = self.stats.lock().unwrap();
            stats.miss_count += 1;
        }
        self.save_stats();
    }

    pub fn delete(&self, key: &str) {
        let path = entry_path(&self.responses_dir, key);
        let size = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<CacheEntry>(&bytes).ok())
            .map(|entry| entry.size_bytes)
            .unwrap_or(0);

        if fs::remove_file(&path).is_ok() {
            let mut stats = self.stats.lock().unwrap();
            stats.total_entries = stats.total_entries.saturating_sub(1);
            stats.total_size_bytes = stats.total_size_bytes.saturating_sub(size);
        }
        self.save_stats();
    }

    pub fn clear(&self) -> u64 {
        let mut count = 0u64;
        if let Ok(read_dir) = fs::read_dir(&self.responses_dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json")
                    && fs::remove_file(&path).is_ok()
                {
                    count += 1;
                }
            }
        }
        *self.stats.lock().unwrap() = CacheStats::default();
        self.save_stats();
        count
    }

    /// All non-expired entries, ordered by last-accessed (falling back to
    /// created-at) descending — most recently used first.
    pub fn list(&self) -> Vec<CacheEntry> {
        let mut entries = Vec::new();
        let now = Utc::now();
        if let Ok(read_dir) = fs::read_dir(&self.responses_dir) {
            for dir_entry in read_dir.flatten() {
                let path = dir_entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Ok(bytes) = fs::read(&path) else { continue };
                let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
                    continue;
                };
                if now > entry.expires_at {
                    continue;
                }
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| {
            let a_key = a.last_accessed.unwrap_or(a.created_at);
            let b_key = b.last_accessed.unwrap_or(b.created_at);
            b_key.cmp(&a_key)
        });
        entries
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.list();
        let mut stats = self.stats.lock().unwrap();
        stats.total_entries = entries.len() as u64;
        stats.total_size_bytes = entries.iter().map(|e| e.size_bytes).sum();
        stats.update_hit_rate();
        let snapshot = stats.clone();
        drop(stats);
        self.save_stats();
        snapshot
    }

    /// Evict the least-recently-used entry repeatedly until the store is back
    /// under budget. `list()` is already MRU-first, so the eviction victim is
    /// the tail of that ordering; ties go to the oldest `created_at`.
    fn evict_if_needed(&self) {
        loop {
            let over_budget = self.stats.lock().unwrap().total_size_bytes > self.max_size_bytes;
            if !over_budget {
                break;
            }
            let mut entries = self.list();
            let Some(victim) = entries.pop() else { break };
            log_debug!(key = %victim.key, bytes = victim.size_bytes, "evicting cache entry over budget");
            self.delete(&victim.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with_budget(mb: u64) -> (CacheStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), mb).unwrap();
        (store, dir)
    }

    #[test]
    fn round_trip_within_ttl() {
        let (store, _dir) = store_with_budget(DEFAULT_MAX_SIZE_MB);
        store.save("k1", GatewayResponse::ok("hello"), 24);
        let got = store.get("k1").unwrap();
        assert_eq!(got.content, "hello");
    }

    #[test]
    fn miss_on_unknown_key() {
        let (store, _dir) = store_with_budget(DEFAULT_MAX_SIZE_MB);
        assert!(store.get("missing").is_none());
        assert_eq!(store.stats().miss_count, 1);
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let (store, _dir) = store_with_budget(DEFAULT_MAX_SIZE_MB);
        store.save("k1", GatewayResponse::ok("hello"), -1);
        assert!(store.get("k1").is_none());
        assert_eq!(store.stats().total_entries, 0);
    }

    #[test]
    fn delete_updates_counters() {
        let (store, _dir) = store_with_budget(DEFAULT_MAX_SIZE_MB);
        store.save("k1", GatewayResponse::ok("hello"), 24);
        assert_eq!(store.stats().total_entries, 1);
        store.delete("k1");
        assert_eq!(store.stats().total_entries, 0);
        assert_eq!(store.stats().total_size_bytes, 0);
    }

    #[test]
    fn clear_removes_everything() {
        let (store, _dir) = store_with_budget(DEFAULT_MAX_SIZE_MB);
        store.save("k1", GatewayResponse::ok("a"), 24);
        store.save("k2", GatewayResponse::ok("b"), 24);
        let removed = store.clear();
        assert_eq!(removed, 2);
        assert_eq!(store.stats().total_entries, 0);
    }

    #[test]
    fn lru_eviction_keeps_store_under_budget() {
        // 1 MiB budget, ten ~200KiB entries: later saves must evict earlier ones.
        let (store, _dir) = store_with_budget(1);
        for i in 0..10 {
            let payload = "x".repeat(200 * 1024);
            store.save(&format!("k{i}"), GatewayResponse::ok(payload), 24);
        }
        assert!(store.stats().total_size_bytes <= 1024 * 1024);
        // newest entries should survive, oldest evicted
        assert!(store.get("k9").is_some());
        assert!(store.get("k0").is_none());
    }
}
