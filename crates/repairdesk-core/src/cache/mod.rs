//! In-memory query cache.
//!
//! This module provides the `QueryCache` that sits between the UI-facing
//! query catalogue and the transport. Results are keyed by `QueryKey`,
//! served stale-while-revalidate, and evicted once nothing has subscribed
//! to them for `collect_after`.
//!
//! Cached data is considered stale after 5 minutes by default.

pub mod entry;
pub mod key;
pub mod manager;
pub mod options;

pub use entry::{EntryInfo, QueryState, QueryStatus};
pub use key::{KeyFilter, KeyPart, QueryKey};
pub use manager::{QueryCache, Subscription};
pub use options::{QueryOptions, RetryPolicy};
