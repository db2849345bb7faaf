//! Small shared helpers: display formatting and lock access.

pub mod format;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use format::age_display;

/// Lock a mutex, recovering the guard if a previous holder panicked.
/// Critical sections in this crate never leave state half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
