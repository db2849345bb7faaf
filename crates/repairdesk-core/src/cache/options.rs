use std::time::Duration;

use super::key::QueryKey;

/// Cached data is served without refetching for 5 minutes.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Unused entries are dropped 10 minutes after their last subscriber leaves.
pub const DEFAULT_COLLECT_AFTER: Duration = Duration::from_secs(10 * 60);

/// One retry for failed reads before the error reaches subscribers.
pub const DEFAULT_RETRIES: u32 = 1;

/// Initial backoff delay before retrying a failed read.
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for the exponential backoff.
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded retry with capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based): `min(base * 2^attempt, max)`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

/// Per-subscription query behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Age after which cached data is refetched on the next subscription.
    /// `Duration::ZERO` treats data as stale immediately.
    pub stale_after: Duration,
    /// Idle time with zero subscribers before the entry is evicted
    pub collect_after: Duration,
    /// When false the subscription never triggers a fetch (dependent queries)
    pub enabled: bool,
    /// Show the previous key's data while the next page of the same query loads
    pub keep_previous_on_key_change: bool,
    /// Index of the page part in the key. Keys that differ anywhere else
    /// never share placeholder data.
    pub page_part: Option<usize>,
    pub retry: RetryPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            collect_after: DEFAULT_COLLECT_AFTER,
            enabled: true,
            keep_previous_on_key_change: false,
            page_part: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueryOptions {
    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn collect_after(mut self, collect_after: Duration) -> Self {
        self.collect_after = collect_after;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn keep_previous(mut self, keep: bool) -> Self {
        self.keep_previous_on_key_change = keep;
        self
    }

    /// Keep the previous data on screen across pages, with the page number
    /// at `index` in the key.
    pub fn keep_previous_page(mut self, index: usize) -> Self {
        self.keep_previous_on_key_change = true;
        self.page_part = Some(index);
        self
    }

    /// Whether data shown for `previous` may stand in while `next` loads
    pub(crate) fn carries_over(&self, previous: &QueryKey, next: &QueryKey) -> bool {
        if !self.keep_previous_on_key_change {
            return false;
        }
        match self.page_part {
            Some(page) => next.same_except_page(previous, page),
            None => next == previous,
        }
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
