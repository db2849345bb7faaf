use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::utils::lock;

/// Capacity of the session event channel.
/// Events are rare (one per refresh), 16 leaves room for slow listeners.
const EVENT_CHANNEL_CAPACITY: usize = 16;

type PendingRefresh = Shared<BoxFuture<'static, Result<(), ApiError>>>;

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The ambient credential was renewed
    Refreshed,
    /// The session cannot be recovered; the UI should navigate to `redirect_to`
    Lost { redirect_to: String },
}

/// Where a single logical request is in the refresh-and-retry cycle.
///
/// Transitions:
///
/// ```text
/// Normal --401--> Refreshing --ok--> Retrying --401--> Failed
///                     |
///                     +---err---> Failed
/// ```
///
/// A request can only reach `Retrying` once, so it is replayed at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Normal,
    Refreshing,
    Retrying,
    Failed,
}

impl RequestPhase {
    /// Transition taken when an attempt comes back 401
    pub fn on_unauthorized(self) -> Self {
        match self {
            RequestPhase::Normal => RequestPhase::Refreshing,
            RequestPhase::Refreshing | RequestPhase::Retrying | RequestPhase::Failed => {
                RequestPhase::Failed
            }
        }
    }

    /// Transition taken when the shared refresh settles
    pub fn on_refresh(self, succeeded: bool) -> Self {
        match (self, succeeded) {
            (RequestPhase::Refreshing, true) => RequestPhase::Retrying,
            _ => RequestPhase::Failed,
        }
    }

    /// Whether the request should be put on the wire in this phase
    pub fn may_send(self) -> bool {
        matches!(self, RequestPhase::Normal | RequestPhase::Retrying)
    }
}

/// Process-wide session bookkeeping, constructed explicitly and shared by `Arc`.
///
/// Owns the single refresh slot: however many requests hit a 401 at once,
/// only one refresh call is in flight and every caller awaits its outcome.
pub struct SessionState {
    refresh: Arc<Mutex<Option<PendingRefresh>>>,
    location: Arc<Mutex<String>>,
    login_path: String,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    pub fn new(login_path: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            refresh: Arc::new(Mutex::new(None)),
            location: Arc::new(Mutex::new(String::from("/"))),
            login_path: login_path.into(),
            events,
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Record the UI's current location (used to avoid redirect loops)
    pub fn set_location(&self, path: impl Into<String>) {
        *lock(&self.location) = path.into();
    }

    pub fn location(&self) -> String {
        lock(&self.location).clone()
    }

    /// Subscribe to session notifications
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        lock(&self.refresh).is_some()
    }

    /// Run `start` as the session refresh, or join the one already running.
    ///
    /// `start` is only invoked when the slot is empty. Any refresh failure is
    /// reported as `AuthExpired`.
    pub async fn refresh_with<F, Fut>(&self, start: F) -> Result<(), ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let pending = {
            let mut slot = lock(&self.refresh);
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight session refresh");
                    pending.clone()
                }
                None => {
                    debug!("Starting session refresh");
                    let pending = self.track(start());
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Wrap a refresh so that it clears the slot and notifies listeners once it settles.
    fn track<Fut>(&self, refresh: Fut) -> PendingRefresh
    where
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let slot = Arc::clone(&self.refresh);
        let location = Arc::clone(&self.location);
        let login_path = self.login_path.clone();
        let events = self.events.clone();

        async move {
            let outcome = refresh.await;
            lock(&slot).take();

            match outcome {
                Ok(()) => {
                    info!("Session refreshed");
                    let _ = events.send(SessionEvent::Refreshed);
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Session refresh failed");
                    let current = lock(&location).clone();
                    if current.contains(&login_path) {
                        debug!(location = %current, "Already on login page, not redirecting");
                    } else {
                        let _ = events.send(SessionEvent::Lost {
                            redirect_to: login_path,
                        });
                    }
                    Err(ApiError::AuthExpired)
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_phase_single_retry() {
        let phase = RequestPhase::Normal.on_unauthorized();
        assert_eq!(phase, RequestPhase::Refreshing);
        assert!(!phase.may_send());

        let phase = phase.on_refresh(true);
        assert_eq!(phase, RequestPhase::Retrying);
        assert!(phase.may_send());

        // A second 401 is terminal
        assert_eq!(phase.on_unauthorized(), RequestPhase::Failed);
    }

    #[test]
    fn test_phase_refresh_failure() {
        assert_eq!(
            RequestPhase::Refreshing.on_refresh(false),
            RequestPhase::Failed
        );
        assert_eq!(RequestPhase::Normal.on_refresh(true), RequestPhase::Failed);
        assert!(!RequestPhase::Failed.may_send());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_share_one_call() {
        let session = SessionState::new("/login");
        let calls = Arc::new(AtomicUsize::new(0));

        let attempt = || {
            let calls = Arc::clone(&calls);
            session.refresh_with(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
        };

        let results = futures::future::join_all((0..5).map(|_| attempt())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!session.is_refreshing());
    }

    #[tokio::test]
    async fn test_slot_cleared_after_settle() {
        let session = SessionState::new("/login");
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            session
                .refresh_with(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }

        // Sequential refreshes each run their own call
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_emits_lost_once() {
        let session = SessionState::new("/login");
        session.set_location("/repairs");
        let mut events = session.events();
        let calls = Arc::new(AtomicUsize::new(0));

        let results = futures::future::join_all((0..3).map(|_| {
            let calls = Arc::clone(&calls);
            session.refresh_with(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(ApiError::Server {
                    status: 401,
                    body: String::new(),
                })
            })
        }))
        .await;

        assert!(results.iter().all(|r| *r == Err(ApiError::AuthExpired)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Lost {
                redirect_to: "/login".to_string()
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_redirect_from_login_page() {
        let session = SessionState::new("/login");
        session.set_location("/login?next=/repairs");
        let mut events = session.events();

        let result = session
            .refresh_with(|| async { Err(ApiError::Network("down".into())) })
            .await;

        assert_eq!(result, Err(ApiError::AuthExpired));
        assert!(events.try_recv().is_err());
    }
}
