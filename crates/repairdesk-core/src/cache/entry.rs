use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::api::ApiError;
use crate::utils::age_display;

use super::options::{QueryOptions, RetryPolicy};

pub(crate) type AnyData = Arc<dyn Any + Send + Sync>;

pub(crate) type FetchOutcome = Result<AnyData, ApiError>;

pub(crate) type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchOutcome> + Send + Sync>;

pub(crate) type InFlight = Shared<BoxFuture<'static, FetchOutcome>>;

/// Lifecycle of a query: `Idle -> Loading -> {Success, Error}`, and back to
/// `Loading` on every refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// What a subscriber sees for its key.
#[derive(Debug)]
pub struct QueryState<T> {
    /// Last successfully fetched value (kept through errors and refetches)
    pub data: Option<Arc<T>>,
    /// Last failure, cleared by the next success
    pub error: Option<ApiError>,
    pub status: QueryStatus,
    /// `data` belongs to the previous key, shown while this key loads
    pub is_placeholder: bool,
    /// Wall-clock time of the last successful fetch
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            status: self.status,
            is_placeholder: self.is_placeholder,
            updated_at: self.updated_at,
        }
    }
}

impl<T: Send + Sync + 'static> QueryState<T> {
    pub(crate) fn from_entry(state: &EntryState) -> Self {
        Self {
            data: state
                .data
                .clone()
                .and_then(|data| data.downcast::<T>().ok()),
            error: state.error.clone(),
            status: state.status,
            is_placeholder: false,
            updated_at: state.updated_at,
        }
    }
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// "just now", "5m ago", ... or `None` if never fetched
    pub fn age_display(&self) -> Option<String> {
        self.updated_at.map(|at| age_display(at, Utc::now()))
    }
}

/// Observable part of an entry, broadcast to subscribers on every change.
#[derive(Clone)]
pub(crate) struct EntryState {
    pub(crate) data: Option<AnyData>,
    pub(crate) error: Option<ApiError>,
    pub(crate) status: QueryStatus,
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl Default for EntryState {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            status: QueryStatus::Idle,
            updated_at: None,
        }
    }
}

/// Diagnostics for one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub status: QueryStatus,
    pub subscribers: usize,
    pub is_stale: bool,
    pub is_fetching: bool,
    pub has_data: bool,
}

/// One slot of the cache.
pub(crate) struct Entry {
    pub(crate) state: watch::Sender<EntryState>,
    /// Monotonic time of the last successful fetch
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) invalidated: bool,
    pub(crate) subscribers: usize,
    /// Subscribers with `enabled = true`
    pub(crate) active: usize,
    /// Generation of the fetch allowed to commit
    pub(crate) generation: u64,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) driver: Option<AbortHandle>,
    pub(crate) fetcher: Option<Fetcher>,
    pub(crate) retry: RetryPolicy,
    pub(crate) stale_after: Duration,
    pub(crate) collect_after: Duration,
    pub(crate) idle_since: Option<Instant>,
    pub(crate) collection: Option<AbortHandle>,
    pub(crate) collection_epoch: u64,
}

impl Entry {
    pub(crate) fn new(options: &QueryOptions) -> Self {
        let (state, _) = watch::channel(EntryState::default());
        Self {
            state,
            fetched_at: None,
            invalidated: false,
            subscribers: 0,
            active: 0,
            generation: 0,
            in_flight: None,
            driver: None,
            fetcher: None,
            retry: options.retry,
            stale_after: options.stale_after,
            collect_after: options.collect_after,
            idle_since: None,
            collection: None,
            collection_epoch: 0,
        }
    }

    /// Register a subscriber, cancelling any pending eviction.
    pub(crate) fn attach(&mut self, options: &QueryOptions) {
        self.cancel_collection();
        self.subscribers += 1;
        if options.enabled {
            self.active += 1;
        }
        self.retry = options.retry;
        self.stale_after = options.stale_after;
        self.collect_after = self.collect_after.max(options.collect_after);
    }

    pub(crate) fn cancel_collection(&mut self) {
        if let Some(handle) = self.collection.take() {
            handle.abort();
        }
        self.idle_since = None;
        self.collection_epoch += 1;
    }

    /// Stale when never fetched, invalidated, or older than `stale_after`
    pub(crate) fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        if self.invalidated {
            return true;
        }
        match self.fetched_at {
            Some(at) => now.saturating_duration_since(at) >= stale_after,
            None => true,
        }
    }

    /// Whether an idle entry has outlived `collect_after`
    pub(crate) fn is_collectable(&self, now: Instant) -> bool {
        self.subscribers == 0
            && self
                .idle_since
                .is_some_and(|since| now.saturating_duration_since(since) >= self.collect_after)
    }

    pub(crate) fn info(&self, now: Instant) -> EntryInfo {
        let state = self.state.borrow();
        EntryInfo {
            status: state.status,
            subscribers: self.subscribers,
            is_stale: self.is_stale(now, self.stale_after),
            is_fetching: self.in_flight.is_some(),
            has_data: state.data.is_some(),
        }
    }

    /// Abort timers and the fetch driver; used on eviction and teardown.
    pub(crate) fn shutdown(&mut self) {
        if let Some(handle) = self.collection.take() {
            handle.abort();
        }
        if let Some(handle) = self.driver.take() {
            handle.abort();
        }
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_state_downcasts_matching_type() {
        let state = EntryState {
            data: Some(Arc::new(vec![1u32, 2, 3]) as AnyData),
            status: QueryStatus::Success,
            ..EntryState::default()
        };

        let typed: QueryState<Vec<u32>> = QueryState::from_entry(&state);
        assert_eq!(typed.data.as_deref(), Some(&vec![1, 2, 3]));

        // A different type reads as no data rather than panicking
        let mismatched: QueryState<String> = QueryState::from_entry(&state);
        assert!(mismatched.data.is_none());
        assert!(mismatched.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness() {
        let mut entry = Entry::new(&QueryOptions::default());
        let stale_after = Duration::from_secs(5);
        assert!(entry.is_stale(Instant::now(), stale_after));

        entry.fetched_at = Some(Instant::now());
        assert!(!entry.is_stale(Instant::now(), stale_after));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(entry.is_stale(Instant::now(), stale_after));

        entry.fetched_at = Some(Instant::now());
        entry.invalidated = true;
        assert!(entry.is_stale(Instant::now(), stale_after));
    }

    #[test]
    fn test_age_display_requires_fetch() {
        let state: QueryState<()> = QueryState {
            data: None,
            error: None,
            status: QueryStatus::Idle,
            is_placeholder: false,
            updated_at: None,
        };
        assert!(state.age_display().is_none());

        let fetched = QueryState {
            updated_at: Some(Utc::now()),
            ..state
        };
        assert_eq!(fetched.age_display().as_deref(), Some("just now"));
    }
}
