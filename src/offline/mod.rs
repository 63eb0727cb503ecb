//! Offline cache worker
//!
//! Intercepts requests bound for the origin. API calls are network-first
//! with a structured 503 when the service cannot be reached; static assets
//! are cache-first from a version-keyed bucket that is precached on install
//! and becomes the only bucket on activation.

pub mod lifecycle;
pub mod network;
pub mod registration;
pub mod request;
pub mod storage;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use lifecycle::WorkerState;
pub use network::{Network, UpstreamNetwork};
pub use registration::{Registration, RegistrationStatus, WorkerMessage, WorkerStatus};
pub use request::{FetchRequest, FetchResponse, ResponseKind};
pub use storage::{CacheBucket, CacheStats, CacheStatsSnapshot, CacheStorage};
pub use worker::{
    InflightGuard, OFFLINE_API_ERROR, OFFLINE_API_MESSAGE, OfflineWorker, Strategy,
    offline_api_response,
};

use std::sync::Arc;

use crate::Result;
use crate::config::OfflineConfig;

/// Open the storage configured by `config`
pub fn open_storage(config: &OfflineConfig) -> Result<Arc<CacheStorage>> {
    let storage = match &config.storage_dir {
        Some(dir) => CacheStorage::persistent(dir)?,
        None => CacheStorage::in_memory(),
    };
    Ok(Arc::new(storage))
}
