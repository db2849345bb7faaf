//! In-memory query cache with stale-while-revalidate reads.
//!
//! Every query key owns one `Entry`. Subscribers read the entry's state
//! through a watch channel; fetches are coalesced per key, tagged with a
//! cache-wide generation number, and only the newest generation commits.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::utils::lock;

use super::entry::{AnyData, Entry, EntryInfo, EntryState, FetchOutcome, Fetcher, InFlight};
use super::key::{KeyFilter, QueryKey};
use super::options::{QueryOptions, RetryPolicy};
use super::{QueryState, QueryStatus};

struct CacheInner {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    generation: AtomicU64,
}

impl CacheInner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Apply a finished fetch if it is still the entry's current generation.
    fn commit(&self, key: &QueryKey, generation: u64, outcome: &FetchOutcome) {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(key) else {
            debug!(key = %key, "Entry evicted before fetch completed, dropping result");
            return;
        };
        if entry.generation != generation {
            debug!(
                key = %key,
                generation,
                current = entry.generation,
                "Discarding superseded fetch result"
            );
            return;
        }

        entry.in_flight = None;
        entry.driver = None;
        match outcome {
            Ok(data) => {
                entry.fetched_at = Some(Instant::now());
                entry.invalidated = false;
                let data = Arc::clone(data);
                entry.state.send_modify(move |state| {
                    state.data = Some(data);
                    state.error = None;
                    state.status = QueryStatus::Success;
                    state.updated_at = Some(Utc::now());
                });
                debug!(key = %key, generation, "Fetch committed");
            }
            Err(error) => {
                let error = error.clone();
                entry.state.send_modify(move |state| {
                    state.error = Some(error);
                    state.status = QueryStatus::Error;
                });
                debug!(key = %key, generation, "Fetch failed, keeping previous data");
            }
        }
    }

    /// Evict an idle entry if no subscriber came back since `epoch` was scheduled.
    fn collect(&self, key: &QueryKey, epoch: u64) {
        let mut entries = lock(&self.entries);
        let due = entries
            .get(key)
            .is_some_and(|entry| entry.subscribers == 0 && entry.collection_epoch == epoch);
        if due {
            if let Some(mut entry) = entries.remove(key) {
                entry.shutdown();
            }
            debug!(key = %key, "Evicted idle cache entry");
        }
    }
}

/// Drop every idle entry past its `collect_after`. Returns the number removed.
fn sweep(entries: &mut HashMap<QueryKey, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|key, entry| {
        if entry.is_collectable(now) {
            debug!(key = %key, "Sweeping idle cache entry");
            entry.shutdown();
            false
        } else {
            true
        }
    });
    before - entries.len()
}

/// Run a fetcher, retrying transient failures with backoff.
async fn fetch_with_retry(key: &QueryKey, fetcher: Fetcher, retry: RetryPolicy) -> FetchOutcome {
    let mut attempt = 0;
    loop {
        debug!(key = %key, attempt, "Fetching");
        match fetcher().await {
            Ok(data) => return Ok(data),
            Err(e) if e.is_retryable() && attempt < retry.retries => {
                let delay = retry.delay(attempt);
                warn!(
                    key = %key,
                    error = %e,
                    retry = attempt + 1,
                    ?delay,
                    "Fetch failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Fetch failed");
                return Err(e);
            }
        }
    }
}

fn erase<T, F, Fut>(fetcher: F) -> Fetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    Arc::new(move || {
        let fetch = fetcher();
        async move { fetch.await.map(|value| Arc::new(value) as AnyData) }.boxed()
    })
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, data: AnyData) -> Result<Arc<T>, ApiError> {
    data.downcast::<T>().map_err(|_| {
        ApiError::InvalidResponse(format!("Cached value for {} has a different type", key))
    })
}

/// Process-wide store of query results.
///
/// Clone is cheap; all clones share the same entries.
///
/// Background fetches and eviction timers are spawned on the current tokio
/// runtime. A fetch started outside a runtime only makes progress while a
/// caller awaits it (`Subscription::settled`, `refetch` or `fetch`).
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to `key`, fetching with `fetcher` when there is no fresh data.
    ///
    /// Cached data is visible immediately; a stale entry keeps its data while
    /// it refetches in the background with status `Loading`. The latest
    /// subscriber's `fetcher` is the one used for refetches.
    pub fn subscribe<T, F, Fut>(
        &self,
        key: QueryKey,
        fetcher: F,
        options: QueryOptions,
    ) -> Subscription<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let fetcher = erase(fetcher);
        let now = Instant::now();

        let (receiver, needs_fetch) = {
            let mut entries = lock(&self.inner.entries);
            sweep(&mut entries, now);

            let entry = entries.entry(key.clone()).or_insert_with(|| {
                debug!(key = %key, "Creating cache entry");
                Entry::new(&options)
            });
            entry.attach(&options);
            entry.fetcher = Some(fetcher);

            let needs_fetch = options.enabled
                && entry.in_flight.is_none()
                && entry.is_stale(now, options.stale_after);
            (entry.state.subscribe(), needs_fetch)
        };

        if needs_fetch {
            self.start_fetch(&key, false);
        } else {
            debug!(key = %key, "Serving cached entry");
        }

        Subscription {
            cache: self.clone(),
            key,
            receiver,
            options,
            placeholder: None,
        }
    }

    /// Resolve `key` to a value: fresh cached data if present, otherwise the
    /// result of a (possibly shared) fetch.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: QueryKey,
        fetcher: F,
        options: QueryOptions,
    ) -> Result<Arc<T>, ApiError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let subscription: Subscription<T> = self.subscribe(key, fetcher, options.enabled(true));
        let pending = self.in_flight(subscription.key());

        match pending {
            Some(pending) => downcast(subscription.key(), pending.await?),
            None => {
                let snapshot = subscription.snapshot();
                match (snapshot.data, snapshot.error) {
                    (Some(data), _) => Ok(data),
                    (None, Some(error)) => Err(error),
                    (None, None) => Err(ApiError::InvalidResponse(format!(
                        "No data cached for {}",
                        subscription.key()
                    ))),
                }
            }
        }
    }

    /// Current data for `key`, if any
    pub fn get_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let entries = lock(&self.inner.entries);
        let data = entries.get(key)?.state.borrow().data.clone()?;
        data.downcast::<T>().ok()
    }

    /// Store `value` under `key` as if it had just been fetched.
    /// Any fetch already running for the key is orphaned.
    pub fn set_data<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        let mut entries = lock(&self.inner.entries);
        let created = !entries.contains_key(&key);
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(&QueryOptions::default()));

        entry.generation = self.inner.next_generation();
        entry.in_flight = None;
        entry.driver = None;
        entry.fetched_at = Some(Instant::now());
        entry.invalidated = false;
        let data = Arc::new(value) as AnyData;
        entry.state.send_modify(move |state| {
            state.data = Some(data);
            state.error = None;
            state.status = QueryStatus::Success;
            state.updated_at = Some(Utc::now());
        });

        if created {
            self.schedule_collection(&key, entry);
        }
        debug!(key = %key, "Cache data set directly");
    }

    /// Mark matching entries stale. Entries with enabled subscribers refetch
    /// now; the rest refetch on their next subscription.
    /// Returns the number of matching entries.
    pub fn invalidate(&self, filter: impl Into<KeyFilter>) -> usize {
        let filter = filter.into();
        let (matched, refetch) = {
            let mut entries = lock(&self.inner.entries);
            let mut matched = 0;
            let mut refetch = Vec::new();
            for (key, entry) in entries.iter_mut() {
                if !filter.matches(key) {
                    continue;
                }
                matched += 1;
                entry.invalidated = true;
                if entry.active > 0 {
                    refetch.push(key.clone());
                }
            }
            (matched, refetch)
        };

        debug!(?filter, matched, refetching = refetch.len(), "Invalidated queries");
        for key in &refetch {
            self.start_fetch(key, true);
        }
        matched
    }

    /// Run a write and, only if it succeeds, invalidate the listed keys.
    ///
    /// Writes are never retried and a failure leaves the cache untouched.
    pub async fn mutate<T, Fut, I>(&self, write: Fut, invalidates: I) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
        I: IntoIterator,
        I::Item: Into<KeyFilter>,
    {
        match write.await {
            Ok(value) => {
                for filter in invalidates {
                    self.invalidate(filter);
                }
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, "Mutation failed, cache left untouched");
                Err(e)
            }
        }
    }

    /// Evict every idle entry past its `collect_after` now.
    /// Returns the number of entries removed.
    pub fn collect_garbage(&self) -> usize {
        let mut entries = lock(&self.inner.entries);
        sweep(&mut entries, Instant::now())
    }

    pub fn entry_info(&self, key: &QueryKey) -> Option<EntryInfo> {
        let entries = lock(&self.inner.entries);
        entries.get(key).map(|entry| entry.info(Instant::now()))
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        lock(&self.inner.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Teardown: cancel eviction timers and fetch drivers, drop every entry.
    /// Live subscriptions keep their last snapshot and see the channel close.
    pub fn clear(&self) {
        let drained: Vec<Entry> = lock(&self.inner.entries)
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let count = drained.len();
        for mut entry in drained {
            entry.shutdown();
        }
        info!(count, "Query cache cleared");
    }

    fn in_flight(&self, key: &QueryKey) -> Option<InFlight> {
        lock(&self.inner.entries)
            .get(key)
            .and_then(|entry| entry.in_flight.clone())
    }

    /// Start a fetch for `key`, or join the one in flight unless `force`.
    ///
    /// A forced fetch supersedes the running one: it takes a newer
    /// generation, so the older result is discarded when it lands.
    fn start_fetch(&self, key: &QueryKey, force: bool) -> Option<InFlight> {
        let mut entries = lock(&self.inner.entries);
        let entry = entries.get_mut(key)?;

        if !force {
            if let Some(ref pending) = entry.in_flight {
                debug!(key = %key, "Joining in-flight fetch");
                return Some(pending.clone());
            }
        }
        let fetcher = entry.fetcher.clone()?;
        if entry.in_flight.is_some() {
            debug!(key = %key, "Superseding in-flight fetch");
        }

        let generation = self.inner.next_generation();
        entry.generation = generation;
        entry.state.send_modify(|state| state.status = QueryStatus::Loading);

        let retry = entry.retry;
        let weak = Arc::downgrade(&self.inner);
        let task_key = key.clone();
        let pending: InFlight = async move {
            let outcome = fetch_with_retry(&task_key, fetcher, retry).await;
            if let Some(inner) = weak.upgrade() {
                inner.commit(&task_key, generation, &outcome);
            }
            outcome
        }
        .boxed()
        .shared();

        entry.in_flight = Some(pending.clone());
        // Drive the fetch even if nobody awaits it (background revalidation).
        entry.driver = Handle::try_current()
            .ok()
            .map(|handle| handle.spawn(pending.clone()).abort_handle());

        Some(pending)
    }

    fn detach(&self, key: &QueryKey, enabled: bool) {
        let mut entries = lock(&self.inner.entries);
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if enabled {
            entry.active = entry.active.saturating_sub(1);
        }
        if entry.subscribers == 0 {
            self.schedule_collection(key, entry);
        }
    }

    /// Arm the eviction timer for an entry that just lost its last subscriber.
    /// Without a runtime the entry is left for the next sweep.
    fn schedule_collection(&self, key: &QueryKey, entry: &mut Entry) {
        entry.cancel_collection();
        entry.idle_since = Some(Instant::now());
        let epoch = entry.collection_epoch;
        let delay = entry.collect_after;

        let Ok(handle) = Handle::try_current() else {
            debug!(key = %key, "No runtime for eviction timer, entry will be swept");
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let key = key.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.collect(&key, epoch);
            }
        });
        entry.collection = Some(task.abort_handle());
    }
}

/// A live interest in one query key. Dropping it unsubscribes.
///
/// Unsubscribing never cancels a running fetch; its result is still cached.
pub struct Subscription<T> {
    cache: QueryCache,
    key: QueryKey,
    receiver: watch::Receiver<EntryState>,
    options: QueryOptions,
    placeholder: Option<Arc<T>>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Current `{data, error, status}` for this subscriber
    pub fn snapshot(&self) -> QueryState<T> {
        let mut snapshot = QueryState::from_entry(&self.receiver.borrow());
        if snapshot.data.is_none() && snapshot.status == QueryStatus::Loading {
            if let Some(ref previous) = self.placeholder {
                snapshot.data = Some(Arc::clone(previous));
                snapshot.is_placeholder = true;
            }
        }
        snapshot
    }

    /// Wait for the next change. Returns false once the entry is gone (cache cleared).
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Wait until the query is no longer loading
    pub async fn settled(&mut self) -> QueryState<T> {
        // Polls the shared fetch as well, so it completes without a driver task
        if let Some(pending) = self.cache.in_flight(&self.key) {
            let _ = pending.await;
        }
        loop {
            let snapshot = self.snapshot();
            if snapshot.status != QueryStatus::Loading || !self.changed().await {
                return snapshot;
            }
        }
    }

    /// Fetch again now, superseding any fetch in flight for this key
    pub async fn refetch(&self) -> Result<Arc<T>, ApiError> {
        let pending = self.cache.start_fetch(&self.key, true).ok_or_else(|| {
            ApiError::Validation(format!("Query {} is no longer cached", self.key))
        })?;
        downcast(&self.key, pending.await?)
    }

    /// Move this subscription to another key (e.g. the next page).
    ///
    /// With `keep_previous_on_key_change`, and when the new key differs from
    /// the old one only in its page part (or not at all without a page part),
    /// the previous data stays visible as a placeholder until the
    /// new key has data of its own. A fetch still running for the old key
    /// lands in the old key's entry only.
    pub fn set_key<F, Fut>(&mut self, key: QueryKey, fetcher: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let previous = self.snapshot().data;
        let mut next = self.cache.subscribe(key, fetcher, self.options.clone());
        if self.options.carries_over(&self.key, &next.key) {
            next.placeholder = previous;
        }
        *self = next;
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cache.detach(&self.key, self.options.enabled);
    }
}
