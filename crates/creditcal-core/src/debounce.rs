//! Debounced credit sync.
//!
//! Sync calls for the same scope that arrive within the debounce window are
//! collapsed into one `POST /sync`. Every call that joined the batch receives
//! that call's outcome. The batch is detached from the map before the request
//! is sent, so calls arriving during the request start a new batch.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use creditcal_client::CreditsApi;
use creditcal_models::{CalendarQuery, CalendarUserCredits};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::metrics::record_sync_batch;

/// What a sync batch reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncScope {
    /// Whatever the server considers the current year.
    CurrentYear,
    Year(i32),
}

impl SyncScope {
    /// The `year` query parameter for this scope.
    pub fn year(&self) -> Option<i32> {
        match self {
            Self::CurrentYear => None,
            Self::Year(year) => Some(*year),
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentYear => write!(f, "current"),
            Self::Year(year) => write!(f, "{}", year),
        }
    }
}

type Waiter = oneshot::Sender<SyncResult<CalendarUserCredits>>;

struct Batch {
    waiters: Vec<Waiter>,
    /// Options of the most recent call.
    query: CalendarQuery,
    /// Identifies the timer allowed to fire this batch.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

type Batches = Arc<Mutex<HashMap<SyncScope, Batch>>>;

pub struct DebouncedSyncCoordinator {
    api: Arc<dyn CreditsApi>,
    window: Duration,
    batches: Batches,
    generations: AtomicU64,
}

impl DebouncedSyncCoordinator {
    pub fn new(api: Arc<dyn CreditsApi>, window: Duration) -> Self {
        Self {
            api,
            window,
            batches: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Sync one year, coalesced with other calls for that year.
    pub async fn sync(&self, year: i32, query: &CalendarQuery) -> SyncResult<CalendarUserCredits> {
        self.enqueue(SyncScope::Year(year), query).await
    }

    /// Sync the server's current year, coalesced with other such calls.
    pub async fn sync_current_year(
        &self,
        query: &CalendarQuery,
    ) -> SyncResult<CalendarUserCredits> {
        self.enqueue(SyncScope::CurrentYear, query).await
    }

    async fn enqueue(
        &self,
        scope: SyncScope,
        query: &CalendarQuery,
    ) -> SyncResult<CalendarUserCredits> {
        let (tx, rx) = oneshot::channel();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        {
            let mut batches = lock(&self.batches);
            let batch = batches.entry(scope).or_insert_with(|| Batch {
                waiters: Vec::new(),
                query: query.clone(),
                generation,
                timer: None,
            });
            batch.waiters.push(tx);
            batch.query = query.clone();
            batch.generation = generation;
            if let Some(timer) = batch.timer.take() {
                timer.abort();
            }
            batch.timer = Some(tokio::spawn(fire(
                self.api.clone(),
                Arc::downgrade(&self.batches),
                scope,
                generation,
                self.window,
            )));
            debug!(scope = %scope, waiters = batch.waiters.len(), "Queued credit sync");
        }

        rx.await.unwrap_or(Err(SyncError::CoordinatorClosed))
    }

    /// Callers waiting on the not-yet-fired batch for `scope`.
    pub fn pending_waiters(&self, scope: SyncScope) -> usize {
        lock(&self.batches)
            .get(&scope)
            .map_or(0, |batch| batch.waiters.len())
    }

    /// Cancel every pending batch. Its callers get `CoordinatorClosed`.
    ///
    /// Batches whose request is already in flight still complete.
    pub fn close(&self) {
        let drained: Vec<Batch> = lock(&self.batches).drain().map(|(_, b)| b).collect();
        for batch in drained {
            if let Some(timer) = batch.timer {
                timer.abort();
            }
        }
    }
}

impl Drop for DebouncedSyncCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}

async fn fire(
    api: Arc<dyn CreditsApi>,
    batches: Weak<Mutex<HashMap<SyncScope, Batch>>>,
    scope: SyncScope,
    generation: u64,
    window: Duration,
) {
    tokio::time::sleep(window).await;

    let Some(batch) = take_batch(&batches, scope, generation) else {
        return;
    };

    let waiters = batch.waiters.len();
    info!(scope = %scope, waiters, "Running debounced credit sync");
    record_sync_batch(waiters);

    let result = api
        .sync_credits(scope.year(), &batch.query)
        .await
        .map_err(SyncError::from);

    if let Err(err) = &result {
        warn!(scope = %scope, waiters, error = %err, "Credit sync failed");
    }

    for waiter in batch.waiters {
        // The caller may have gone away.
        let _ = waiter.send(result.clone());
    }
}

/// Detach the batch for `scope` if `generation` still owns it.
fn take_batch(
    batches: &Weak<Mutex<HashMap<SyncScope, Batch>>>,
    scope: SyncScope,
    generation: u64,
) -> Option<Batch> {
    let batches = batches.upgrade()?;
    let mut batches = lock(&batches);
    match batches.get(&scope) {
        Some(batch) if batch.generation == generation => batches.remove(&scope),
        _ => None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
