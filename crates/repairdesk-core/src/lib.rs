//! Data-access core for the repair shop dashboard.
//!
//! Two layers, built bottom-up:
//!
//! - `api`: a session-aware HTTP transport that refreshes expired cookies
//!   once (single-flight across the process) and replays the request, plus
//!   the typed `ApiClient` for the backend's endpoints.
//! - `cache`: an in-memory query cache with stale-while-revalidate reads,
//!   request coalescing, idle eviction and invalidation after writes.
//!
//! `DataContext` wires both together from a `Config`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod models;
pub mod queries;
pub mod utils;

pub use api::{ApiClient, ApiError, ProductFilter, RepairFilter};
pub use cache::{QueryCache, QueryKey, QueryOptions, QueryState, QueryStatus, Subscription};
pub use config::Config;
pub use context::DataContext;
pub use queries::Queries;
