//! Request and response values seen by the offline worker

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

/// Where a response came from, relative to the proxied origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response, safe to cache
    Basic,
    /// Cross-origin response after a redirect
    Cors,
    /// Produced without reaching the origin
    Opaque,
}

/// An intercepted request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request method
    pub method: Method,
    /// Origin-relative URL (path and query)
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
}

impl FetchRequest {
    /// Create a request
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Body-less GET, as used for precaching
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Set a header
    #[must_use]
    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// URL without its query string
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(self.url.as_str(), |(path, _)| path)
    }

    /// Whether this is a GET
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether the caller accepts an HTML page
    ///
    /// A missing `Accept` header counts as not accepting HTML.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// A response handed back to the caller
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Origin classification
    pub kind: ResponseKind,
}

impl FetchResponse {
    /// Same-origin response
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    /// Locally produced JSON response that must never be cached downstream
    pub fn synthesized_json(status: StatusCode, value: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        Self {
            status,
            headers,
            body: Bytes::from(value.to_string()),
            kind: ResponseKind::Opaque,
        }
    }

    /// Mark as not cacheable by the caller
    #[must_use]
    pub fn no_store(mut self) -> Self {
        self.headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        self
    }

    /// Exactly 200
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }
}

impl IntoResponse for FetchResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_strips_query() {
        assert_eq!(FetchRequest::get("/api/analyze?x=1").path(), "/api/analyze");
        assert_eq!(FetchRequest::get("/styles.css").path(), "/styles.css");
    }

    #[test]
    fn accepts_html_requires_header() {
        let bare = FetchRequest::get("/");
        assert!(!bare.accepts_html());

        let page = FetchRequest::get("/").with_header(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        assert!(page.accepts_html());
    }

    #[test]
    fn synthesized_json_is_opaque_and_uncacheable() {
        let resp = FetchResponse::synthesized_json(StatusCode::SERVICE_UNAVAILABLE, &json!({"offline": true}));
        assert_eq!(resp.kind, ResponseKind::Opaque);
        assert_eq!(resp.headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(resp.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(resp.body, Bytes::from_static(b"{\"offline\":true}"));
    }
}
