//! In-process stand-in for the backend, used by tests across the crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Method, StatusCode};

use crate::auth::SessionState;
use crate::utils::lock;

use super::transport::{Connector, Request, Response, Transport};
use super::ApiError;

pub(crate) const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Scripted backend: answers 401 while the session is expired, renews the
/// session on `POST /auth/token/refresh/`, and serves canned routes otherwise.
pub(crate) struct MockBackend {
    session_valid: AtomicBool,
    always_unauthorized: AtomicBool,
    refresh_succeeds: bool,
    offline: bool,
    refresh_delay: Duration,
    routes: Mutex<HashMap<(Method, String), (StatusCode, String)>>,
    requests: Mutex<Vec<Request>>,
    data_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl MockBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            session_valid: AtomicBool::new(true),
            always_unauthorized: AtomicBool::new(false),
            refresh_succeeds: true,
            offline: false,
            refresh_delay: Duration::ZERO,
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            data_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        })
    }
}

/// Builder-style tweaks, applied before the backend is shared.
pub(crate) trait MockBackendExt {
    fn expired(self) -> Self;
    fn refresh_fails(self) -> Self;
    fn always_unauthorized(self) -> Self;
    fn offline(self) -> Self;
    fn with_refresh_delay(self, delay: Duration) -> Self;
    fn route(self, method: Method, path: &str, status: StatusCode, body: &str) -> Self;
}

impl MockBackendExt for Arc<MockBackend> {
    fn expired(self) -> Self {
        self.expire_session();
        self
    }

    fn refresh_fails(self) -> Self {
        let mut backend = unwrap_unique(self);
        backend.refresh_succeeds = false;
        Arc::new(backend)
    }

    fn always_unauthorized(self) -> Self {
        self.set_always_unauthorized(true);
        self
    }

    fn offline(self) -> Self {
        let mut backend = unwrap_unique(self);
        backend.offline = true;
        Arc::new(backend)
    }

    fn with_refresh_delay(self, delay: Duration) -> Self {
        let mut backend = unwrap_unique(self);
        backend.refresh_delay = delay;
        Arc::new(backend)
    }

    fn route(self, method: Method, path: &str, status: StatusCode, body: &str) -> Self {
        lock(&self.routes).insert((method, path.to_string()), (status, body.to_string()));
        self
    }
}

fn unwrap_unique(backend: Arc<MockBackend>) -> MockBackend {
    Arc::try_unwrap(backend)
        .unwrap_or_else(|_| panic!("MockBackend must be configured before it is shared"))
}

impl MockBackend {
    pub(crate) fn transport(self: &Arc<Self>) -> Transport {
        Transport::new(
            Arc::clone(self) as Arc<dyn Connector>,
            Arc::new(SessionState::new("/login")),
            REFRESH_PATH,
        )
    }

    pub(crate) fn expire_session(&self) {
        self.session_valid.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_always_unauthorized(&self, value: bool) {
        self.always_unauthorized.store(value, Ordering::SeqCst);
    }

    pub(crate) fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Every non-refresh request received, in arrival order
    pub(crate) fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }
}

impl Connector for MockBackend {
    fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, ApiError>> {
        async move {
            if self.offline {
                return Err(ApiError::Network("connection refused".to_string()));
            }

            if request.method == Method::POST && request.path == REFRESH_PATH {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                if !self.refresh_delay.is_zero() {
                    tokio::time::sleep(self.refresh_delay).await;
                }
                return if self.refresh_succeeds {
                    self.session_valid.store(true, Ordering::SeqCst);
                    Ok(Response::new(StatusCode::OK, "{}"))
                } else {
                    Ok(Response::new(StatusCode::UNAUTHORIZED, "token_not_valid"))
                };
            }

            self.data_calls.fetch_add(1, Ordering::SeqCst);
            lock(&self.requests).push(request.clone());

            if !self.session_valid.load(Ordering::SeqCst)
                || self.always_unauthorized.load(Ordering::SeqCst)
            {
                return Ok(Response::new(StatusCode::UNAUTHORIZED, "not_authenticated"));
            }

            let routed = lock(&self.routes)
                .get(&(request.method.clone(), request.path.clone()))
                .cloned();
            Ok(match routed {
                Some((status, body)) => Response::new(status, body),
                None => Response::new(StatusCode::OK, "{}"),
            })
        }
        .boxed()
    }
}
