//! Keyed TTL cache with in-flight de-duplication.
//!
//! Each key is either `Ready` (data plus the instant it was stored) or
//! `Loading` (a shared handle to the producer's future). Concurrent callers
//! for a loading key await the same future, so at most one producer runs per
//! key. Failures are never cached.
//!
//! Every load carries a generation number. A load that finishes after its key
//! was invalidated, cleared or force-refreshed does not write back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::metrics::{record_cache_hit, record_cache_join, record_cache_miss};

type SharedFetch<T> = Shared<BoxFuture<'static, SyncResult<T>>>;

enum Slot<T> {
    Ready { data: T, stored_at: Instant },
    Loading { generation: u64, fetch: SharedFetch<T> },
}

struct Entries<T> {
    slots: HashMap<String, Slot<T>>,
    next_generation: u64,
}

/// Per-call cache options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Overrides the cache's default TTL.
    pub ttl: Option<Duration>,
    /// Evict the key and run the producer regardless of freshness.
    pub force_refresh: bool,
    /// Upper bound on waiting for another caller's in-flight load.
    pub join_timeout: Option<Duration>,
}

impl CacheOptions {
    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn join_timeout(mut self, limit: Duration) -> Self {
        self.join_timeout = Some(limit);
        self
    }
}

enum Lookup<T> {
    Hit(T),
    Join(SharedFetch<T>),
    Started(SharedFetch<T>),
}

/// TTL cache keyed by string, generic over the cached value.
///
/// Clones share the same entries.
pub struct KeyedCache<T> {
    name: &'static str,
    default_ttl: Duration,
    entries: Arc<Mutex<Entries<T>>>,
}

impl<T> Clone for KeyedCache<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            default_ttl: self.default_ttl,
            entries: self.entries.clone(),
        }
    }
}

impl<T> KeyedCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `name` labels metrics and logs.
    pub fn new(name: &'static str, default_ttl: Duration) -> Self {
        Self {
            name,
            default_ttl,
            entries: Arc::new(Mutex::new(Entries {
                slots: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Return the cached value for `key`, join an in-flight load of it, or
    /// start a new load with `producer`.
    ///
    /// `producer` is invoked under the cache lock and must only build its
    /// future; the future runs outside the lock.
    pub async fn get<F, Fut>(&self, key: &str, options: CacheOptions, producer: F) -> SyncResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        match self.lookup_or_start(key, options, producer) {
            Lookup::Hit(data) => Ok(data),
            Lookup::Started(fetch) => fetch.await,
            Lookup::Join(fetch) => match options.join_timeout {
                Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                    SyncError::PeerTimeout {
                        key: key.to_string(),
                        waited: limit,
                    }
                })?,
                None => fetch.await,
            },
        }
    }

    fn lookup_or_start<F, Fut>(&self, key: &str, options: CacheOptions, producer: F) -> Lookup<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let ttl = options.ttl.unwrap_or(self.default_ttl);
        let mut entries = lock(&self.entries);

        if options.force_refresh {
            entries.slots.remove(key);
        }

        match entries.slots.get(key) {
            Some(Slot::Ready { data, stored_at }) if stored_at.elapsed() < ttl => {
                debug!(cache = self.name, key, "Cache hit");
                record_cache_hit(self.name);
                return Lookup::Hit(data.clone());
            }
            Some(Slot::Loading { fetch, .. }) => {
                debug!(cache = self.name, key, "Joining in-flight load");
                record_cache_join(self.name);
                return Lookup::Join(fetch.clone());
            }
            _ => {}
        }

        record_cache_miss(self.name);
        let generation = entries.next_generation;
        entries.next_generation += 1;

        let owner = Arc::downgrade(&self.entries);
        let owned_key = key.to_string();
        let load = producer();
        let fetch = async move {
            let result = load.await;
            store_outcome(&owner, owned_key, generation, &result);
            result
        }
        .boxed()
        .shared();

        entries.slots.insert(
            key.to_string(),
            Slot::Loading {
                generation,
                fetch: fetch.clone(),
            },
        );
        Lookup::Started(fetch)
    }

    /// Store `data` under `key` as fresh, replacing any in-flight load.
    pub fn set(&self, key: impl Into<String>, data: T) {
        lock(&self.entries).slots.insert(
            key.into(),
            Slot::Ready {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    /// Fresh cached value without loading. `None` ttl uses the default.
    pub fn peek(&self, key: &str, ttl: Option<Duration>) -> Option<T> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        match lock(&self.entries).slots.get(key) {
            Some(Slot::Ready { data, stored_at }) if stored_at.elapsed() < ttl => {
                Some(data.clone())
            }
            _ => None,
        }
    }

    pub fn is_loading(&self, key: &str) -> bool {
        matches!(lock(&self.entries).slots.get(key), Some(Slot::Loading { .. }))
    }

    /// Drop one key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        lock(&self.entries).slots.remove(key).is_some()
    }

    /// Drop every key matching `pattern`. Returns how many were dropped.
    pub fn invalidate_matching(&self, pattern: &Regex) -> usize {
        self.retain_keys(|key| !pattern.is_match(key))
    }

    /// Keep only keys for which `keep` is true. Returns how many were dropped.
    pub fn retain_keys(&self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.slots.len();
        entries.slots.retain(|key, _| keep(key));
        let dropped = before - entries.slots.len();
        if dropped > 0 {
            debug!(cache = self.name, dropped, "Invalidated cache entries");
        }
        dropped
    }

    /// Drop stored values for which `drop` is true. Loading keys are kept.
    /// Returns how many were dropped.
    pub fn invalidate_where(&self, mut drop: impl FnMut(&str, &T) -> bool) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.slots.len();
        entries.slots.retain(|key, slot| match slot {
            Slot::Ready { data, .. } => !drop(key, data),
            Slot::Loading { .. } => true,
        });
        let dropped = before - entries.slots.len();
        if dropped > 0 {
            debug!(cache = self.name, dropped, "Invalidated cache entries");
        }
        dropped
    }

    pub fn clear(&self) {
        lock(&self.entries).slots.clear();
    }

    /// Number of keys, loading ones included.
    pub fn len(&self) -> usize {
        lock(&self.entries).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of the keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.entries).slots.keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write a finished load back if its slot still belongs to it.
fn store_outcome<T>(
    owner: &Weak<Mutex<Entries<T>>>,
    key: String,
    generation: u64,
    result: &SyncResult<T>,
) where
    T: Clone,
{
    let Some(entries) = owner.upgrade() else {
        return;
    };
    let mut entries = lock(&entries);
    let current = matches!(
        entries.slots.get(&key),
        Some(Slot::Loading { generation: g, .. }) if *g == generation
    );
    if !current {
        return;
    }
    match result {
        Ok(data) => {
            entries.slots.insert(
                key,
                Slot::Ready {
                    data: data.clone(),
                    stored_at: Instant::now(),
                },
            );
        }
        Err(_) => {
            entries.slots.remove(&key);
        }
    }
}
