//! Bounded TTL cache for routed responses.
//!
//! Expiry is lazy (checked on read). Eviction is by insertion order only;
//! hits are counted but never change which entry goes first.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Duration, Local};
use qr_core::config::CacheConfig;
use qr_core::types::{Query, RoutingMode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub text: String,
    pub backend_used: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: CachedResponse,
    pub created_at: DateTime<Local>,
    pub hits: u64,
    seq: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
    stats: CacheStats,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
}

pub struct ResponseCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl: Duration::seconds(config.ttl_secs.min(MAX_TTL_SECS) as i64),
            max_entries: config.max_entries.max(1),
            clock,
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => now - entry.created_at >= self.ttl,
        };
        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            debug!(key = %short(key), "cache entry expired");
            return None;
        }
        inner.stats.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.hits += 1;
        Some(entry.value.clone())
    }

    /// Inserts or overwrites. At capacity, the oldest insertion is evicted first.
    pub fn put(&self, key: impl Into<String>, value: CachedResponse) {
        let key = key.into();
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.remove(&key);
        while inner.entries.len() >= self.max_entries {
            let Some((_, oldest)) = inner.order.pop_first() else { break };
            inner.entries.remove(&oldest);
            inner.stats.evictions += 1;
            debug!(key = %short(&oldest), "cache full, evicted oldest entry");
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(key.clone(), CacheEntry { key, value, created_at: now, hits: 0, seq });
        inner.stats.insertions += 1;
    }

    /// Raw entry, including hit count; ignores TTL.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.lock().entries.get(key).cloned()
    }

    /// Physically present entries, expired or not.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .entries
            .values()
            .filter(|e| now - e.created_at >= self.ttl)
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        inner.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lowercased, trimmed, whitespace-collapsed query text.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 over the normalized text, the routing mode and a coarse context
/// signature. Volatile fields (timestamps, request ids) never take part.
pub fn fingerprint(text: &str, mode: RoutingMode, has_context: bool) -> String {
    let signature = if has_context { "domain-context" } else { "no-context" };
    let mut hasher = Sha256::new();
    hasher.update(normalize_query(text).as_bytes());
    hasher.update([0u8]);
    hasher.update(mode.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(signature.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn query_fingerprint(query: &Query) -> String {
    fingerprint(&query.text, query.options.mode, query.has_domain_context())
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}
