//! TTL cache of ready backend instances plus their health records.
//!
//! Both maps sit behind one coarse lock; readers copy a snapshot out under it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use crate::backend::Backend;
use crate::health::HealthStatus;
use crate::observability::metrics;

/// A cached backend instance.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub instance: Arc<dyn Backend>,
    pub loaded_at: Instant,
    pub ttl: Duration,
    /// Copied from the adapter capabilities at load time.
    pub health_probe: bool,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.loaded_at) >= self.ttl
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    health: HashMap<String, HealthStatus>,
}

/// Health result for the instance that was probed.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub instance: Arc<dyn Backend>,
    pub status: HealthStatus,
}

/// Thread-safe backend cache.
#[derive(Debug)]
pub struct BackendCache {
    ttl: Duration,
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BackendCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a fresh instance for `name`, dropping it if it has expired.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Backend>> {
        let now = Instant::now();
        let expired = {
            let state = self.state.read().expect("backend cache lock poisoned");
            match state.entries.get(name) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_lookup(true);
                    return Some(entry.instance.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut state = self.state.write().expect("backend cache lock poisoned");
            if state.entries.get(name).is_some_and(|e| e.is_expired(now)) {
                state.entries.remove(name);
                tracing::debug!(backend = %name, "Cached backend expired");
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup(false);
        None
    }

    /// Like [`lookup`](Self::lookup) without touching hit counters or expired entries.
    pub fn peek(&self, name: &str) -> Option<Arc<dyn Backend>> {
        let now = Instant::now();
        self.state
            .read()
            .expect("backend cache lock poisoned")
            .entries
            .get(name)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.instance.clone())
    }

    pub fn insert(&self, name: &str, instance: Arc<dyn Backend>, health_probe: bool) {
        let entry = CacheEntry {
            instance,
            loaded_at: Instant::now(),
            ttl: self.ttl,
            health_probe,
        };
        self.state
            .write()
            .expect("backend cache lock poisoned")
            .entries
            .insert(name.to_string(), entry);
    }

    /// Remove one entry. Returns whether it was present.
    pub fn invalidate(&self, name: &str) -> bool {
        self.state
            .write()
            .expect("backend cache lock poisoned")
            .entries
            .remove(name)
            .is_some()
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.write().expect("backend cache lock poisoned");
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        before - state.entries.len()
    }

    /// Copy of every unexpired entry.
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        let now = Instant::now();
        self.state
            .read()
            .expect("backend cache lock poisoned")
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    /// Store health results, evicting every probed instance reported unhealthy.
    ///
    /// A result only applies while the cache still holds the instance that was
    /// probed; an entry replaced during the probe keeps its slot and record.
    pub fn apply_health(&self, results: &[HealthCheck]) {
        let mut state = self.state.write().expect("backend cache lock poisoned");
        for check in results {
            let name = check.name.as_str();
            match state.entries.get(name) {
                Some(current) if !Arc::ptr_eq(&current.instance, &check.instance) => {
                    tracing::debug!(backend = %name, "Discarding health result for replaced instance");
                    continue;
                }
                Some(_) if !check.status.healthy => {
                    state.entries.remove(name);
                    tracing::warn!(backend = %name, error = ?check.status.error, "Evicted unhealthy backend");
                }
                _ => {}
            }
            state.health.insert(name.to_string(), check.status.clone());
        }
    }

    pub fn health(&self) -> BTreeMap<String, HealthStatus> {
        self.state
            .read()
            .expect("backend cache lock poisoned")
            .health
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hits over all lookups; 0.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
