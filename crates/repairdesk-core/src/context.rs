//! The explicitly constructed data-access context.
//!
//! `DataContext` wires the session state, the transport, the typed client
//! and the query cache together. It is passed to whatever needs data; there
//! is no global instance.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, Connector, ReqwestConnector, Transport};
use crate::auth::{SessionEvent, SessionState};
use crate::cache::QueryCache;
use crate::config::Config;
use crate::queries::Queries;

pub struct DataContext {
    session: Arc<SessionState>,
    api: ApiClient,
    cache: QueryCache,
    queries: Queries,
}

impl DataContext {
    /// Build a context talking to the configured backend over HTTP.
    pub fn new(config: &Config) -> Result<Self> {
        let connector = ReqwestConnector::new(config.api_base_url.clone(), config.request_timeout())
            .context("Failed to build HTTP client")?;
        info!(base_url = %connector.base_url(), "Data context ready");
        Ok(Self::with_connector(Arc::new(connector), config))
    }

    /// Build a context over any connector.
    pub fn with_connector(connector: Arc<dyn Connector>, config: &Config) -> Self {
        let session = Arc::new(SessionState::new(config.login_path.clone()));
        let transport = Arc::new(Transport::new(
            connector,
            Arc::clone(&session),
            config.refresh_path.clone(),
        ));
        let api = ApiClient::new(transport);
        let cache = QueryCache::new();
        let queries = Queries::new(cache.clone(), api.clone(), config.query_options());

        Self {
            session,
            api,
            cache,
            queries,
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn queries(&self) -> &Queries {
        &self.queries
    }

    /// Session notifications, e.g. to navigate to the login page on `Lost`
    pub fn session_events(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.session.events()
    }

    /// End the session server-side and forget everything cached for it.
    /// The cache is cleared even when the logout call fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.api.logout().await;
        if let Err(ref e) = result {
            warn!(error = %e, "Logout request failed");
        }
        self.cache.clear();
        result
    }

    /// Teardown: cancel cache timers and in-flight fetches, drop all entries.
    pub fn shutdown(&self) {
        self.cache.clear();
        info!("Data context shut down");
    }
}
