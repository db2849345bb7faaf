//! Session-aware HTTP transport.
//!
//! `Transport::send` puts a `Request` on the wire through a `Connector` and,
//! when the server answers 401, joins (or starts) the single process-wide
//! session refresh before replaying the request exactly once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::{RequestPhase, SessionState};

use super::ApiError;

// ============================================================================
// Request / Response
// ============================================================================

/// An outbound API call, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Append a query parameter only when a value is present
    pub fn query_opt<V: ToString>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::Validation(format!("Failed to serialize body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Reject requests that could never be routed, before anything is sent.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.path.is_empty() {
            return Err(ApiError::Validation("Empty request path".to_string()));
        }
        if !self.path.starts_with('/') {
            return Err(ApiError::Validation(format!(
                "Request path must start with '/': {}",
                self.path
            )));
        }
        if self.path.chars().any(char::is_whitespace) {
            return Err(ApiError::Validation(format!(
                "Request path contains whitespace: {:?}",
                self.path
            )));
        }
        if self.query.iter().any(|(name, _)| name.is_empty()) {
            return Err(ApiError::Validation("Empty query parameter name".to_string()));
        }
        Ok(())
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON. An empty body (e.g. 204) decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let bytes: &[u8] = if self.body.is_empty() { b"null" } else { &self.body };
        serde_json::from_slice(bytes).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse {} response: {}", self.status, e))
        })
    }

    /// Turn a non-2xx response into the matching `ApiError`
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.text()))
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Puts a single request on the wire. No retry or session logic lives here.
pub trait Connector: Send + Sync {
    fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, ApiError>>;
}

/// `Connector` backed by reqwest. The in-memory cookie store carries the
/// session credentials, so callers never attach tokens themselves.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestConnector {
    client: Client,
    base_url: String,
}

impl ReqwestConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl Connector for ReqwestConnector {
    fn execute<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, ApiError>> {
        async move {
            let url = self.url(&request.path);
            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .headers(request.headers.clone());
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?.to_vec();

            Ok(Response {
                status,
                headers,
                body,
            })
        }
        .boxed()
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Sends requests with transparent recovery from an expired session.
pub struct Transport {
    connector: Arc<dyn Connector>,
    session: Arc<SessionState>,
    refresh_path: String,
}

impl Transport {
    pub fn new(
        connector: Arc<dyn Connector>,
        session: Arc<SessionState>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            session,
            refresh_path: refresh_path.into(),
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Send a request, refreshing the session and replaying once on 401.
    ///
    /// Statuses other than 401 and connection failures are returned as-is.
    pub async fn send(&self, request: Request) -> Result<Response, ApiError> {
        request.validate()?;

        let mut phase = RequestPhase::Normal;
        loop {
            match phase {
                RequestPhase::Normal | RequestPhase::Retrying => {
                    debug!(
                        method = %request.method,
                        path = %request.path,
                        ?phase,
                        "Sending request"
                    );
                    let response = self.connector.execute(&request).await?;
                    if response.status != StatusCode::UNAUTHORIZED {
                        return response.error_for_status();
                    }
                    phase = phase.on_unauthorized();
                    if phase == RequestPhase::Failed {
                        warn!(path = %request.path, "Still unauthorized after session refresh");
                    }
                }
                RequestPhase::Refreshing => {
                    let refreshed = self
                        .session
                        .refresh_with(|| self.refresh_call())
                        .await
                        .is_ok();
                    phase = phase.on_refresh(refreshed);
                }
                RequestPhase::Failed => return Err(ApiError::AuthExpired),
            }
        }
    }

    /// The refresh endpoint call. Goes straight to the connector so a 401
    /// here can never trigger another refresh.
    fn refresh_call(&self) -> impl Future<Output = Result<(), ApiError>> + Send + 'static {
        let connector = Arc::clone(&self.connector);
        let request = Request::post(self.refresh_path.clone());
        async move {
            let response = connector.execute(&request).await?;
            response.error_for_status().map(|_| ())
        }
    }
}
