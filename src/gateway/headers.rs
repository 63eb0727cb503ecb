//! Cache-Control policy for proxied responses

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};

/// Extensions served with a long-lived cache policy
const STATIC_EXTENSIONS: [&str; 7] = [".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".ico"];

/// `Cache-Control` for API responses (5 minutes)
pub const API_CACHE_CONTROL: &str = "public, max-age=300";

/// `Cache-Control` for static assets (24 hours)
pub const STATIC_CACHE_CONTROL: &str = "public, max-age=86400";

/// `Cache-Control` for everything else
pub const NO_STORE_CACHE_CONTROL: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Which caching policy a path gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Short public caching
    Api,
    /// Long public caching
    Static,
    /// Never cache (HTML and everything else)
    NoStore,
}

impl CachePolicy {
    /// Classify a request path (query already stripped)
    pub fn for_path(path: &str, api_prefix: &str) -> Self {
        if path.starts_with(api_prefix) {
            Self::Api
        } else if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            Self::Static
        } else {
            Self::NoStore
        }
    }

    /// Add this policy's headers unless the response already carries a
    /// `Cache-Control`
    pub fn apply(self, headers: &mut HeaderMap) {
        if headers.contains_key(header::CACHE_CONTROL) {
            return;
        }
        match self {
            Self::Api => {
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(API_CACHE_CONTROL));
                headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
            }
            Self::Static => {
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(STATIC_CACHE_CONTROL));
                headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
            }
            Self::NoStore => {
                headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(NO_STORE_CACHE_CONTROL),
                );
                headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
            }
        }
    }
}

/// Middleware adding cache headers by request path
pub async fn cache_headers_middleware(
    State(api_prefix): State<Arc<str>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let policy = CachePolicy::for_path(request.uri().path(), &api_prefix);
    let mut response = next.run(request).await;
    policy.apply(response.headers_mut());
    response
}
