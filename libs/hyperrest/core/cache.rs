//! In-memory response cache keyed by request fingerprint

use reqwest::Method;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Stable fingerprint of a request (method + path)
pub fn fingerprint(method: &Method, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(path.trim_matches('/').as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Response cache with a fixed time-to-live
///
/// Expired entries are swept on insert at most once per TTL, so paths that
/// are never requested again do not accumulate.
pub struct ResponseCache {
    /// Entries keyed by request fingerprint
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    last_sweep: Instant,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            last_sweep: Instant::now(),
        }
    }

    /// Get a live entry, evicting it if it has expired
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                debug!("Cache entry {} expired", key);
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: String, value: Value) {
        let now = Instant::now();
        if now.duration_since(self.last_sweep) >= self.ttl {
            self.cleanup_expired();
        }
        self.entries.insert(key, CacheEntry { value, expires_at: now + self.ttl });
    }

    /// Drop every expired entry
    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        self.last_sweep = now;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Cleaned up {} expired cache entries", removed);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
