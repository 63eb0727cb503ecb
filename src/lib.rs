//! Token Analyzer Library
//!
//! Client and offline-caching proxy for a token transaction analysis service.
//!
//! # Features
//!
//! - **Analysis client**: validates form input, submits the CSV to
//!   `/api/analyze`, tracks loading/results/error state
//! - **Rendering**: transactions and whale report tables (HTML and text)
//! - **Export**: active tab as CSV or pretty JSON
//! - **Offline worker**: network-first API, cache-first static assets,
//!   version-keyed cache buckets with install/activate lifecycle
//! - **Gateway**: axum reverse proxy hosting the worker, with CORS, cache
//!   headers and API rate limiting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod gateway;
pub mod offline;
pub mod render;

pub use analyzer_core::{AnalysisResult, Metric, TransactionRecord, WhaleRecord};
pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Internal(e.to_string())),
    }
}
