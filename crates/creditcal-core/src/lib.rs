//! Credit calendar core.
//!
//! This crate provides:
//! - [`KeyedCache`]: TTL cache with in-flight de-duplication
//! - [`OptimisticGuard`]: protection for usage edits awaiting confirmation
//! - [`DebouncedSyncCoordinator`]: coalesced calendar sync per year
//! - [`CreditCalendarStore`]: resilient month loads and full-year caching
//! - [`CreditTrackingService`]: the per-session facade over all of the above

pub mod calendar_store;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod keyed_cache;
pub mod metrics;
pub mod optimistic_guard;
pub mod service;

#[cfg(test)]
mod testing;

pub use calendar_store::{CreditCalendarStore, DegradeReason, MonthLoad};
pub use clock::{Clock, FixedClock, SystemClock, YearPolicy};
pub use config::CalendarConfig;
pub use debounce::{DebouncedSyncCoordinator, SyncScope};
pub use error::{SyncError, SyncResult};
pub use keyed_cache::{CacheOptions, KeyedCache};
pub use optimistic_guard::{GuardKey, OptimisticGuard, PendingUpdate};
pub use service::CreditTrackingService;
