//! Network access to the proxied origin

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::request::{FetchRequest, FetchResponse, ResponseKind};
use crate::config::UpstreamConfig;
use crate::{Error, Result};

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Something that can perform a fetch
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Any HTTP status is a success; only transport
    /// failures are errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Forwards requests to the configured upstream origin
pub struct UpstreamNetwork {
    base: Url,
    client: Client,
}

impl UpstreamNetwork {
    /// Create a network bound to `config.url`
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid upstream URL '{}': {e}", config.url)))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { base, client })
    }

    /// Upstream origin
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base.origin()
    }

    /// Upstream URL for an origin-relative request target
    ///
    /// Path and query replace the base's own; the target is never
    /// resolved as a reference, so `//host/x` stays a path on the origin.
    fn target(&self, url: &str) -> Result<Url> {
        if !url.starts_with('/') {
            return Err(Error::Network(format!(
                "Request URL must be origin-relative: '{url}'"
            )));
        }
        let without_fragment = url.split_once('#').map_or(url, |(head, _)| head);
        let (path, query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (without_fragment, None),
        };

        let mut target = self.base.clone();
        target.set_path(path);
        target.set_query(query);
        target.set_fragment(None);

        if !self.same_origin(&target) {
            return Err(Error::Network(format!(
                "Request URL '{url}' leaves the upstream origin"
            )));
        }
        Ok(target)
    }
}

#[async_trait]
impl Network for UpstreamNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let target = self.target(&request.url)?;

        let mut headers = strip_hop_by_hop(&request.headers);
        // Compression is renegotiated by the gateway's own layer
        headers.remove(header::ACCEPT_ENCODING);

        debug!(method = %request.method, url = %target, "Forwarding to upstream");

        let response = self
            .client
            .request(request.method.clone(), target)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let kind = if self.same_origin(response.url()) {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };
        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read upstream body: {e}")))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
            kind,
        })
    }
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out
}
