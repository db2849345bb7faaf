//! REST API client module for the repair shop backend.
//!
//! This module provides the `ApiClient` for the repairs, store orders,
//! inventory and catalogue endpoints, on top of a `Transport` that handles
//! the session cookie lifecycle.
//!
//! Authentication is ambient: the backend sets HTTP-only cookies on login
//! and the transport refreshes them once when a request comes back 401.

pub mod client;
pub mod error;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, ProductFilter, RepairFilter};
pub use error::ApiError;
pub use reqwest::Method;
pub use transport::{Connector, Request, ReqwestConnector, Response, Transport};
