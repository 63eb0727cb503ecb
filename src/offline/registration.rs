//! Worker registration: which version is serving and which is waiting

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::lifecycle::WorkerState;
use super::network::Network;
use super::request::{FetchRequest, FetchResponse};
use super::storage::{CacheStatsSnapshot, CacheStorage};
use super::worker::OfflineWorker;
use crate::Result;
use crate::config::OfflineConfig;

/// Control message posted to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Promote the waiting worker now
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    /// Anything else; accepted and ignored
    #[serde(other)]
    Unknown,
}

/// Snapshot of one worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    /// Cache version tag
    pub version: String,
    /// Lifecycle state
    pub state: WorkerState,
    /// Fetches being served
    pub inflight: usize,
}

impl WorkerStatus {
    fn of(worker: &OfflineWorker) -> Self {
        Self {
            version: worker.version().to_string(),
            state: worker.state(),
            inflight: worker.inflight(),
        }
    }
}

/// Snapshot of the registration
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationStatus {
    /// Worker serving fetches
    pub active: Option<WorkerStatus>,
    /// Installed worker waiting for handoff
    pub waiting: Option<WorkerStatus>,
    /// Cache bucket names in creation order
    pub buckets: Vec<String>,
    /// Strategy counters
    pub cache: CacheStatsSnapshot,
}

/// Owns the active and waiting workers
pub struct Registration {
    storage: Arc<CacheStorage>,
    network: Arc<dyn Network>,
    active: RwLock<Option<Arc<OfflineWorker>>>,
    waiting: RwLock<Option<Arc<OfflineWorker>>>,
    /// Serialises installs and promotions
    promotion: Mutex<()>,
}

impl Registration {
    /// Empty registration; fetches pass straight through until a worker activates
    pub fn new(storage: Arc<CacheStorage>, network: Arc<dyn Network>) -> Self {
        Self {
            storage,
            network,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            promotion: Mutex::new(()),
        }
    }

    /// Worker currently serving fetches
    pub fn active(&self) -> Option<Arc<OfflineWorker>> {
        self.active.read().clone()
    }

    /// Worker waiting for handoff
    pub fn waiting(&self) -> Option<Arc<OfflineWorker>> {
        self.waiting.read().clone()
    }

    /// Shared cache storage
    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    /// Install a worker for `config.version`
    ///
    /// Registering the version that is already active or waiting is a
    /// no-op. A freshly installed worker activates at once when nothing is
    /// active or the active worker is idle; otherwise it waits.
    pub async fn register(&self, config: OfflineConfig) -> Result<Arc<OfflineWorker>> {
        let _promotion = self.promotion.lock().await;

        if let Some(existing) = self
            .active()
            .into_iter()
            .chain(self.waiting())
            .find(|w| w.version() == config.version)
        {
            info!(version = %config.version, "Version already registered");
            return Ok(existing);
        }

        let worker = Arc::new(OfflineWorker::new(
            config,
            Arc::clone(&self.storage),
            Arc::clone(&self.network),
        ));
        worker.install().await?;

        let replaced = self.waiting.write().replace(Arc::clone(&worker));
        if let Some(previous) = replaced {
            previous.mark_redundant();
        }

        let idle = self.active().is_none_or(|active| active.inflight() == 0);
        if idle {
            self.promote_locked().await?;
        } else {
            info!(version = %worker.version(), "Worker installed and waiting");
        }
        Ok(worker)
    }

    /// Promote the waiting worker regardless of in-flight fetches
    ///
    /// Returns whether a worker was promoted.
    pub async fn skip_waiting(&self) -> Result<bool> {
        let _promotion = self.promotion.lock().await;
        self.promote_locked().await
    }

    /// Handle a control message
    pub async fn message(&self, message: &WorkerMessage) -> Result<()> {
        match message {
            WorkerMessage::SkipWaiting => {
                if self.skip_waiting().await? {
                    info!("Waiting worker promoted by SKIP_WAITING");
                }
            }
            WorkerMessage::Unknown => {}
        }
        Ok(())
    }

    /// Promote the waiting worker once the active one has gone idle
    pub async fn try_handoff(&self) -> Result<bool> {
        if self.waiting.read().is_none() {
            return Ok(false);
        }
        let _promotion = self.promotion.lock().await;
        if self.active().is_some_and(|active| active.inflight() > 0) {
            return Ok(false);
        }
        self.promote_locked().await
    }

    /// Caller must hold `promotion`
    async fn promote_locked(&self) -> Result<bool> {
        let next = self.waiting.write().take();
        let Some(next) = next else {
            return Ok(false);
        };

        next.activate().await?;

        let previous = self.active.write().replace(Arc::clone(&next));
        if let Some(previous) = previous {
            previous.mark_redundant();
            info!(from = %previous.version(), to = %next.version(), "Worker handoff complete");
        }
        Ok(true)
    }

    /// Route a request through the active worker
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let Some(worker) = self.active() else {
            return self.network.fetch(&request).await;
        };

        let response = {
            let _inflight = worker.begin_fetch();
            worker.handle_fetch(request).await
        };

        if let Err(e) = self.try_handoff().await {
            warn!(error = %e, "Worker handoff failed");
        }
        response
    }

    /// Status snapshot for the control endpoint
    pub fn status(&self) -> RegistrationStatus {
        RegistrationStatus {
            active: self.active().as_deref().map(WorkerStatus::of),
            waiting: self.waiting().as_deref().map(WorkerStatus::of),
            buckets: self.storage.keys(),
            cache: self.storage.stats().snapshot(),
        }
    }
}
