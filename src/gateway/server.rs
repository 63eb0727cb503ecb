//! Gateway server

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::rate_limit::ApiRateLimiter;
use super::router::{AppState, create_router};
use crate::config::Config;
use crate::offline::{self, Network, OfflineWorker, Registration, UpstreamNetwork};
use crate::{Error, Result};

/// How often idle rate limit entries are dropped
const LIMITER_HOUSEKEEPING: Duration = Duration::from_secs(60);

/// Offline-caching gateway in front of the analysis service
pub struct Gateway {
    /// Configuration
    config: Config,
    /// File the configuration came from, re-read on SIGHUP
    config_path: Option<PathBuf>,
    /// Origin access
    network: Arc<dyn Network>,
    /// Worker registration, when offline support is enabled
    registration: Option<Arc<Registration>>,
}

impl Gateway {
    /// Create a gateway and install the configured worker version
    pub async fn new(config: Config, config_path: Option<PathBuf>) -> Result<Self> {
        let network: Arc<dyn Network> = Arc::new(UpstreamNetwork::new(&config.upstream)?);

        let registration = if config.offline.enabled {
            let storage = offline::open_storage(&config.offline)?;
            let registration = Arc::new(Registration::new(storage, Arc::clone(&network)));
            // An unreachable origin must not keep the proxy down
            if let Err(e) = registration.register(config.offline.clone()).await {
                warn!(version = %config.offline.version, error = %e, "Initial worker install failed, proxying without cache");
            }
            Some(registration)
        } else {
            None
        };

        Ok(Self {
            config,
            config_path,
            network,
            registration,
        })
    }

    /// Bound address from config
    fn addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        ))
    }

    /// Run the gateway until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr()?).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let limiter = Arc::new(ApiRateLimiter::new(
            &self.config.rate_limit,
            &self.config.offline.api_prefix,
        ));
        let state = Arc::new(AppState {
            registration: self.registration.clone(),
            network: Arc::clone(&self.network),
            max_body_size: self.config.server.max_body_size,
        });
        let app = create_router(state, &self.config, Arc::clone(&limiter));

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        let local = listener.local_addr()?;
        info!("============================================================");
        info!("TOKEN ANALYZER GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %local, upstream = %self.config.upstream.url, "Listening");
        match &self.registration {
            Some(registration) => {
                let status = registration.status();
                info!(
                    version = %self.config.offline.version,
                    active = ?status.active.map(|w| w.version),
                    buckets = ?status.buckets,
                    "OFFLINE worker enabled"
                );
                info!("  POST http://{local}/__worker/message  (control)");
                info!("  GET  http://{local}/__worker/status   (status)");
            }
            None => warn!("OFFLINE worker disabled - requests are proxied without caching"),
        }
        if self.config.rate_limit.enabled {
            info!(
                requests_per_minute = self.config.rate_limit.requests_per_minute,
                "RATE LIMIT enabled for API submissions"
            );
        }
        info!("============================================================");

        // Rate limiter housekeeping
        let mut housekeeping_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIMITER_HOUSEKEEPING);
            loop {
                tokio::select! {
                    _ = interval.tick() => limiter.retain_recent(),
                    _ = housekeeping_rx.recv() => break,
                }
            }
        });

        #[cfg(unix)]
        if let Some(registration) = &self.registration {
            spawn_reload_task(
                Arc::clone(registration),
                self.config_path.clone(),
                shutdown_tx.subscribe(),
            )?;
        }

        let notify = shutdown_tx.clone();
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = notify.send(());
        });

        // Open connections get shutdown_timeout to drain
        let mut drain_rx = shutdown_tx.subscribe();
        let drain_timeout = self.config.server.shutdown_timeout;
        tokio::select! {
            result = server.into_future() => result.map_err(|e| Error::Internal(e.to_string()))?,
            () = async {
                let _ = drain_rx.recv().await;
                tokio::time::sleep(drain_timeout).await;
            } => warn!(timeout = ?drain_timeout, "Shutdown timeout elapsed, closing open connections"),
        }

        info!("Gateway stopped");
        Ok(())
    }
}

/// Re-read the config on SIGHUP and register its offline section when it
/// differs from the registered worker's
#[cfg(unix)]
fn spawn_reload_task(
    registration: Arc<Registration>,
    config_path: Option<PathBuf>,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sighup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    if let Err(e) = reload_offline(&registration, config_path.as_deref()).await {
                        warn!(error = %e, "Reload failed, keeping current worker");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });

    Ok(())
}

/// Load the config and register its offline section unless the newest
/// registered worker already runs it
///
/// Returns the registered worker, or `None` when nothing changed. With no
/// worker registered (the startup install failed) the same config is
/// installed again.
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) async fn reload_offline(
    registration: &Registration,
    config_path: Option<&Path>,
) -> Result<Option<Arc<OfflineWorker>>> {
    let next = Config::load(config_path)?.offline;

    let registered = registration.waiting().or_else(|| registration.active());
    if registered.as_ref().is_some_and(|worker| worker.config() == &next) {
        info!(version = %next.version, "Offline configuration unchanged");
        return Ok(None);
    }

    let worker = registration.register(next).await?;
    info!(version = %worker.version(), state = %worker.state(), "Registered worker from reloaded configuration");
    Ok(Some(worker))
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
