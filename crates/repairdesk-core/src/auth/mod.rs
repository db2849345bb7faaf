//! Session handling for cookie-authenticated requests.
//!
//! This module provides:
//! - `SessionState`: single-flight token refresh shared by every request
//! - `SessionEvent`: notifications when the session is refreshed or lost
//! - `RequestPhase`: per-request unauthorized/refresh/retry state machine

pub mod session;

pub use session::{RequestPhase, SessionEvent, SessionState};
