//! Per-client rate limiting of analysis submissions

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota};
use serde_json::json;
use tracing::warn;

use crate::config::RateLimitConfig;

/// Seconds a limited client is told to wait
pub const RETRY_AFTER_SECS: u64 = 60;

/// Limits API POSTs per client IP
pub struct ApiRateLimiter {
    api_prefix: String,
    limiter: Option<DefaultKeyedRateLimiter<IpAddr>>,
}

impl ApiRateLimiter {
    /// Create a limiter; disabled or zero quota means unlimited
    pub fn new(config: &RateLimitConfig, api_prefix: &str) -> Self {
        let limiter = NonZeroU32::new(config.requests_per_minute)
            .filter(|_| config.enabled)
            .map(|quota| DefaultKeyedRateLimiter::keyed(Quota::per_minute(quota)));

        Self {
            api_prefix: api_prefix.to_string(),
            limiter,
        }
    }

    /// Whether the request is subject to limiting
    pub fn applies_to(&self, method: &Method, path: &str) -> bool {
        self.limiter.is_some() && method == Method::POST && path.starts_with(&self.api_prefix)
    }

    /// Take a permit for `client`
    pub fn check(&self, client: IpAddr) -> bool {
        self.limiter
            .as_ref()
            .is_none_or(|limiter| limiter.check_key(&client).is_ok())
    }

    /// Forget clients whose quota has fully replenished
    pub fn retain_recent(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
        }
    }
}

/// Middleware rejecting API POSTs over quota with `429`
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<ApiRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.applies_to(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| addr.ip());

    if limiter.check(client) {
        next.run(request).await
    } else {
        warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        rate_limited_response()
    }
}

fn rate_limited_response() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", RETRY_AFTER_SECS.to_string())],
        Json(json!({
            "error": "Rate limit exceeded",
            "message": "Too many requests. Please try again later.",
            "retry_after": RETRY_AFTER_SECS,
        })),
    )
        .into_response()
}
