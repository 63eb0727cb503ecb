//! Test doubles shared by the offline worker tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use parking_lot::Mutex;

use super::network::Network;
use super::request::{FetchRequest, FetchResponse, ResponseKind};
use crate::config::OfflineConfig;
use crate::{Error, Result};

/// In-memory origin with switchable connectivity
pub struct StubNetwork {
    routes: Mutex<HashMap<String, (StatusCode, ResponseKind, &'static str)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// The static assets of the analyzer front end
    pub fn with_site() -> Self {
        let network = Self::new();
        network.route("/", StatusCode::OK, "<h1>home</h1>");
        network.route("/index.html", StatusCode::OK, "<h1>home</h1>");
        network.route("/styles.css", StatusCode::OK, "body {}");
        network.route("/client.js", StatusCode::OK, "console.log(1)");
        network.route("/offline.html", StatusCode::OK, "<h1>offline</h1>");
        network
    }

    pub fn route(&self, url: &str, status: StatusCode, body: &'static str) {
        self.routes
            .lock()
            .insert(url.to_string(), (status, ResponseKind::Basic, body));
    }

    pub fn route_cors(&self, url: &str, body: &'static str) {
        self.routes
            .lock()
            .insert(url.to_string(), (StatusCode::OK, ResponseKind::Cors, body));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }

        let route = self.routes.lock().get(request.path()).copied();
        let (status, kind, body) = route.unwrap_or((StatusCode::NOT_FOUND, ResponseKind::Basic, "not found"));
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Ok(FetchResponse {
            kind,
            ..FetchResponse::new(status, headers, body)
        })
    }
}

pub fn config(version: &str, manifest: &[&str]) -> OfflineConfig {
    OfflineConfig {
        version: version.to_string(),
        manifest: manifest.iter().map(ToString::to_string).collect(),
        ..OfflineConfig::default()
    }
}

pub fn html_request(url: &str) -> FetchRequest {
    FetchRequest::get(url).with_header(header::ACCEPT, HeaderValue::from_static("text/html"))
}

/// Poll `check` for up to a second
pub async fn wait_for(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
