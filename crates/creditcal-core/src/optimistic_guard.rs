//! Short-lived protection for usage edits awaiting server confirmation.
//!
//! Protection is a pure function of the registration instant: an entry is
//! protected while its age is under the window. The per-entry tokio timer
//! only removes stale entries from the map, and only the registration that
//! spawned it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Identifies one period entry of one credit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardKey {
    pub card_id: String,
    pub credit_id: String,
    pub period_number: u32,
}

impl GuardKey {
    pub fn new(
        card_id: impl Into<String>,
        credit_id: impl Into<String>,
        period_number: u32,
    ) -> Self {
        Self {
            card_id: card_id.into(),
            credit_id: credit_id.into(),
            period_number,
        }
    }
}

impl fmt::Display for GuardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.card_id, self.credit_id, self.period_number)
    }
}

/// A protected edit, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub key: GuardKey,
    pub age: Duration,
}

struct Protection {
    registration: u64,
    registered_at: Instant,
    cleanup: Option<JoinHandle<()>>,
}

impl Protection {
    fn cancel_cleanup(self) {
        if let Some(handle) = self.cleanup {
            handle.abort();
        }
    }
}

type Protections = Arc<Mutex<HashMap<GuardKey, Protection>>>;

pub struct OptimisticGuard {
    window: Duration,
    entries: Protections,
    next_registration: AtomicU64,
}

impl OptimisticGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_registration: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Protect a period entry, replacing any earlier protection of it.
    pub fn register(&self, card_id: &str, credit_id: &str, period_number: u32) {
        self.register_key(GuardKey::new(card_id, credit_id, period_number));
    }

    pub fn register_key(&self, key: GuardKey) {
        self.register_entry(key);
    }

    /// Register `key` and return the id of this registration.
    fn register_entry(&self, key: GuardKey) -> u64 {
        let registration = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let registered_at = Instant::now();
        // Outside a runtime the entry simply waits for `clear`.
        let cleanup = Handle::try_current().ok().map(|handle| {
            handle.spawn(expire(
                Arc::downgrade(&self.entries),
                key.clone(),
                registration,
                self.window,
            ))
        });

        debug!(key = %key, "Registered optimistic update");
        let previous = lock(&self.entries).insert(
            key,
            Protection {
                registration,
                registered_at,
                cleanup,
            },
        );
        if let Some(previous) = previous {
            previous.cancel_cleanup();
        }
        registration
    }

    pub fn is_protected(&self, card_id: &str, credit_id: &str, period_number: u32) -> bool {
        self.is_key_protected(&GuardKey::new(card_id, credit_id, period_number))
    }

    pub fn is_key_protected(&self, key: &GuardKey) -> bool {
        lock(&self.entries)
            .get(key)
            .is_some_and(|p| p.registered_at.elapsed() < self.window)
    }

    /// Release protection early. Returns whether an entry existed.
    pub fn clear(&self, card_id: &str, credit_id: &str, period_number: u32) -> bool {
        self.clear_key(&GuardKey::new(card_id, credit_id, period_number))
    }

    pub fn clear_key(&self, key: &GuardKey) -> bool {
        match lock(&self.entries).remove(key) {
            Some(protection) => {
                protection.cancel_cleanup();
                debug!(key = %key, "Cleared optimistic update");
                true
            }
            None => false,
        }
    }

    /// Clear `key` only if it still holds `registration`.
    fn release(&self, key: &GuardKey, registration: u64) {
        let mut entries = lock(&self.entries);
        if !entries
            .get(key)
            .is_some_and(|p| p.registration == registration)
        {
            debug!(key = %key, "Optimistic update re-registered, keeping newer protection");
            return;
        }
        if let Some(protection) = entries.remove(key) {
            protection.cancel_cleanup();
            debug!(key = %key, "Released optimistic update");
        }
    }

    pub fn clear_all(&self) {
        let drained: Vec<Protection> = lock(&self.entries).drain().map(|(_, p)| p).collect();
        for protection in drained {
            protection.cancel_cleanup();
        }
    }

    /// Entries still inside the window, oldest first.
    pub fn pending(&self) -> Vec<PendingUpdate> {
        let mut pending: Vec<PendingUpdate> = lock(&self.entries)
            .iter()
            .map(|(key, p)| PendingUpdate {
                key: key.clone(),
                age: p.registered_at.elapsed(),
            })
            .filter(|p| p.age < self.window)
            .collect();
        pending.sort_by(|a, b| b.age.cmp(&a.age));
        pending
    }

    /// Number of entries still inside the window.
    pub fn len(&self) -> usize {
        lock(&self.entries)
            .values()
            .filter(|p| p.registered_at.elapsed() < self.window)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `work` with `key` protected, releasing it when `work` finishes,
    /// fails, or is dropped. A later registration of the same key outlives
    /// this release.
    pub async fn run_protected<F, T>(&self, key: GuardKey, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let registration = self.register_entry(key.clone());
        let _release = scopeguard::guard(key, |key| {
            self.release(&key, registration);
        });
        work.await
    }
}

impl Drop for OptimisticGuard {
    fn drop(&mut self) {
        self.clear_all();
    }
}

async fn expire(
    entries: Weak<Mutex<HashMap<GuardKey, Protection>>>,
    key: GuardKey,
    registration: u64,
    window: Duration,
) {
    tokio::time::sleep(window).await;
    let Some(entries) = entries.upgrade() else {
        return;
    };
    let mut entries = lock(&entries);
    if entries
        .get(&key)
        .is_some_and(|p| p.registration == registration)
    {
        entries.remove(&key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(3);

    fn tracked(guard: &OptimisticGuard) -> usize {
        guard.entries.lock().unwrap().len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_protection_expires_after_window() {
        let guard = OptimisticGuard::new(WINDOW);
        guard.register("amex-gold", "dining", 2);
        assert!(guard.is_protected("amex-gold", "dining", 2));
        assert!(!guard.is_protected("amex-gold", "dining", 3));

        tokio::time::sleep(WINDOW + Duration::from_millis(1)).await;

        assert!(!guard.is_protected("amex-gold", "dining", 2));
        assert_eq!(tracked(&guard), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protection_is_inert_without_timer() {
        let guard = OptimisticGuard::new(WINDOW);
        guard.register("c", "k", 1);
        tokio::time::advance(WINDOW).await;
        assert!(!guard.is_protected("c", "k", 1));
        assert!(guard.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_restarts_window() {
        let guard = OptimisticGuard::new(WINDOW);
        guard.register("c", "k", 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        guard.register("c", "k", 1);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(guard.is_protected("c", "k", 1));
        assert_eq!(tracked(&guard), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_and_clear_all() {
        let guard = OptimisticGuard::new(WINDOW);
        guard.register("c", "k", 1);
        guard.register("c", "k", 2);
        assert_eq!(guard.len(), 2);

        assert!(guard.clear("c", "k", 1));
        assert!(!guard.clear("c", "k", 1));
        assert!(!guard.is_protected("c", "k", 1));

        guard.clear_all();
        assert!(guard.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_lists_oldest_first() {
        let guard = OptimisticGuard::new(WINDOW);
        guard.register("c", "first", 1);
        tokio::time::advance(Duration::from_secs(1)).await;
        guard.register("c", "second", 1);

        let pending = guard.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].key, GuardKey::new("c", "first", 1));
        assert_eq!(pending[0].key.to_string(), "c-first-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_protected_releases_on_success_and_failure() {
        let guard = OptimisticGuard::new(WINDOW);
        let key = GuardKey::new("c", "k", 4);

        let ok = guard
            .run_protected(key.clone(), async {
                assert!(guard.is_key_protected(&key));
                Ok::<_, String>(1)
            })
            .await;
        assert_eq!(ok, Ok(1));
        assert!(!guard.is_key_protected(&key));

        let failed = guard
            .run_protected(key.clone(), async { Err::<u32, _>("rejected".to_string()) })
            .await;
        assert!(failed.is_err());
        assert!(!guard.is_key_protected(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_protected_releases_when_cancelled() {
        let guard = OptimisticGuard::new(WINDOW);
        let key = GuardKey::new("c", "k", 1);

        let outcome = tokio::time::timeout(
            Duration::from_millis(10),
            guard.run_protected(key.clone(), tokio::time::sleep(Duration::from_secs(60))),
        )
        .await;

        assert!(outcome.is_err());
        assert!(!guard.is_key_protected(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_edits_keep_the_later_protection() {
        let guard = OptimisticGuard::new(WINDOW);
        let key = GuardKey::new("c", "k", 1);

        let first = guard.run_protected(key.clone(), tokio::time::sleep(Duration::from_millis(10)));
        let second = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            guard
                .run_protected(key.clone(), async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    guard.is_key_protected(&key)
                })
                .await
        };
        let ((), protected_after_first_finished) = tokio::join!(first, second);

        assert!(protected_after_first_finished);
        assert!(!guard.is_key_protected(&key));
        assert_eq!(tracked(&guard), 0);
    }
}
