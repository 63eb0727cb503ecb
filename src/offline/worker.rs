//! Offline cache worker
//!
//! One worker serves one cache version. API requests go to the network
//! first and degrade to a structured 503; everything else is served from
//! the cache first and copied into the current bucket after a miss.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::http::StatusCode;
use parking_lot::RwLock;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lifecycle::WorkerState;
use super::network::Network;
use super::request::{FetchRequest, FetchResponse, ResponseKind};
use super::storage::CacheStorage;
use crate::config::OfflineConfig;
use crate::{Error, Result};

/// `error` field of the offline API payload
pub const OFFLINE_API_ERROR: &str = "API unavailable";

/// `message` field of the offline API payload
pub const OFFLINE_API_MESSAGE: &str =
    "The service is currently unavailable. Please try again later.";

/// How a request is answered, decided before any I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Network, then the offline payload
    NetworkFirst,
    /// Cache, then network, then the offline page
    CacheFirst,
}

/// The 503 answered for API requests that cannot reach the service
pub fn offline_api_response() -> FetchResponse {
    FetchResponse::synthesized_json(
        StatusCode::SERVICE_UNAVAILABLE,
        &json!({
            "error": OFFLINE_API_ERROR,
            "message": OFFLINE_API_MESSAGE,
            "offline": true,
        }),
    )
}

/// A versioned offline worker
pub struct OfflineWorker {
    config: OfflineConfig,
    storage: Arc<CacheStorage>,
    network: Arc<dyn Network>,
    state: RwLock<WorkerState>,
    inflight: AtomicUsize,
}

impl OfflineWorker {
    /// Create a worker in the `installing` state
    pub fn new(config: OfflineConfig, storage: Arc<CacheStorage>, network: Arc<dyn Network>) -> Self {
        Self {
            config,
            storage,
            network,
            state: RwLock::new(WorkerState::Installing),
            inflight: AtomicUsize::new(0),
        }
    }

    /// Cache version tag this worker owns
    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Worker configuration
    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Fetches currently being served
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: WorkerState) -> Result<()> {
        let mut state = self.state.write();
        *state = state.transition(next)?;
        debug!(version = %self.config.version, state = %next, "Worker state changed");
        Ok(())
    }

    /// Retire this worker. No-op if already redundant.
    pub fn mark_redundant(&self) {
        let mut state = self.state.write();
        if *state != WorkerState::Redundant {
            *state = WorkerState::Redundant;
            info!(version = %self.config.version, "Worker is redundant");
        }
    }

    /// Precache the manifest into this worker's bucket
    ///
    /// Every manifest URL must come back 2xx, otherwise nothing is stored,
    /// the worker becomes redundant and the first failure is returned.
    pub async fn install(&self) -> Result<()> {
        self.state().transition(WorkerState::Installed)?;
        info!(
            version = %self.config.version,
            urls = self.config.manifest.len(),
            "Installing offline worker"
        );

        let fetches = self.config.manifest.iter().map(|url| self.precache(url));
        let responses = match futures::future::try_join_all(fetches).await {
            Ok(responses) => responses,
            Err(e) => {
                warn!(version = %self.config.version, error = %e, "Install failed");
                self.mark_redundant();
                return Err(e);
            }
        };

        let existed = self.storage.has(self.version());
        let stored = self.storage.open(self.version()).and_then(|bucket| {
            responses
                .iter()
                .try_for_each(|(url, response)| bucket.put(url, response))
        });
        if let Err(e) = stored {
            warn!(version = %self.config.version, error = %e, "Failed to store precached responses");
            if !existed {
                let _ = self.storage.delete(self.version());
            }
            self.mark_redundant();
            return Err(e);
        }

        self.set_state(WorkerState::Installed)?;
        info!(version = %self.config.version, cached = responses.len(), "Offline worker installed");
        Ok(())
    }

    async fn precache(&self, url: &str) -> Result<(String, FetchResponse)> {
        let response = self
            .network
            .fetch(&FetchRequest::get(url))
            .await
            .map_err(|e| Error::Install {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status.is_success() {
            return Err(Error::Install {
                url: url.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        Ok((url.to_string(), response))
    }

    /// Delete every bucket except this worker's and start serving
    ///
    /// Returns the names of the deleted buckets.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.set_state(WorkerState::Activating)?;

        let mut deleted = Vec::new();
        for name in self.storage.keys() {
            if name == self.config.version {
                continue;
            }
            if let Err(e) = self.storage.delete(&name) {
                self.mark_redundant();
                return Err(e);
            }
            deleted.push(name);
        }

        self.set_state(WorkerState::Activated)?;
        info!(version = %self.config.version, deleted = ?deleted, "Offline worker activated");
        Ok(deleted)
    }

    /// Pick the strategy for a request from its URL alone
    pub fn strategy(&self, request: &FetchRequest) -> Strategy {
        if request.path().starts_with(&self.config.api_prefix) {
            Strategy::NetworkFirst
        } else {
            Strategy::CacheFirst
        }
    }

    /// Answer an intercepted request
    ///
    /// API requests never fail; a static request fails only when both the
    /// cache and the network miss and no offline page applies.
    pub async fn handle_fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        match self.strategy(&request) {
            Strategy::NetworkFirst => Ok(self.network_first(&request).await),
            Strategy::CacheFirst => self.cache_first(request).await,
        }
    }

    async fn network_first(&self, request: &FetchRequest) -> FetchResponse {
        match self.network.fetch(request).await {
            Ok(response) if response.is_ok() => response,
            Ok(response) => {
                warn!(url = %request.url, status = %response.status, "API request failed");
                self.storage.stats().record_offline();
                offline_api_response()
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "API request failed");
                self.storage.stats().record_offline();
                offline_api_response()
            }
        }
    }

    async fn cache_first(&self, request: FetchRequest) -> Result<FetchResponse> {
        if let Some(hit) = self.storage.match_request(&request) {
            debug!(url = %request.url, "Cache hit");
            return Ok(hit);
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                self.storage.stats().record_network_fallback();
                if request.is_get()
                    && response.is_ok()
                    && response.kind == ResponseKind::Basic
                    && self.state() == WorkerState::Activated
                {
                    drop(self.store_in_background(request.url, response.clone()));
                }
                Ok(response)
            }
            Err(e) => {
                if request.accepts_html() {
                    if let Some(page) = self.storage.match_url(&self.config.offline_page) {
                        info!(url = %request.url, error = %e, "Network unavailable, serving offline page");
                        self.storage.stats().record_offline();
                        return Ok(page.no_store());
                    }
                }
                warn!(url = %request.url, error = %e, "Network unavailable and nothing cached");
                Err(e)
            }
        }
    }

    /// Copy a response into this worker's bucket without delaying the caller
    ///
    /// Skipped once the bucket is gone: a newer worker may have activated
    /// between the response and the write.
    fn store_in_background(&self, url: String, response: FetchResponse) -> JoinHandle<()> {
        let storage = Arc::clone(&self.storage);
        let version = self.config.version.clone();
        tokio::task::spawn_blocking(move || {
            match storage.put_if_present(&version, &url, &response) {
                Ok(true) => debug!(version = %version, url = %url, "Stored network response"),
                Ok(false) => debug!(version = %version, url = %url, "Bucket retired, response not stored"),
                Err(e) => warn!(version = %version, url = %url, error = %e, "Failed to store network response"),
            }
        })
    }

    /// Count a fetch as in flight until the guard drops
    pub fn begin_fetch(self: &Arc<Self>) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        InflightGuard {
            worker: Arc::clone(self),
        }
    }
}

/// Keeps a worker's in-flight count raised while alive
pub struct InflightGuard {
    worker: Arc<OfflineWorker>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.worker.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}
