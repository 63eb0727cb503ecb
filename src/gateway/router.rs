//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use super::headers::cache_headers_middleware;
use super::rate_limit::{ApiRateLimiter, rate_limit_middleware};
use crate::config::{Config, CorsConfig};
use crate::offline::{FetchRequest, Network, Registration, WorkerMessage};

/// Shared application state
pub struct AppState {
    /// Worker registration; `None` when offline support is disabled
    pub registration: Option<Arc<Registration>>,
    /// Direct access to the origin
    pub network: Arc<dyn Network>,
    /// Largest request body forwarded
    pub max_body_size: usize,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, config: &Config, limiter: Arc<ApiRateLimiter>) -> Router {
    let api_prefix: Arc<str> = Arc::from(config.offline.api_prefix.as_str());

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/__worker/message", post(worker_message_handler))
        .route("/__worker/status", get(worker_status_handler))
        .fallback(proxy_handler)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(middleware::from_fn_with_state(api_prefix, cache_headers_middleware));

    let router = if config.cors.enabled {
        router.layer(cors_layer(&config.cors))
    } else {
        router
    };

    router
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy from config; `*` allows any origin without credentials
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            header::ACCEPT,
            header::ORIGIN,
        ])
        .max_age(config.max_age);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let worker = state
        .registration
        .as_ref()
        .and_then(|r| r.active())
        .map(|w| w.version().to_string());

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "offline": state.registration.is_some(),
        "worker": worker,
    }))
}

/// POST /__worker/message handler
///
/// Anything that is not a recognised message is accepted and ignored.
async fn worker_message_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(registration) = &state.registration else {
        return offline_disabled();
    };

    let message = serde_json::from_slice::<WorkerMessage>(&body).unwrap_or(WorkerMessage::Unknown);
    debug!(message = ?message, "Worker message");

    match registration.message(&message).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            warn!(error = %e, "Worker message failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /__worker/status handler
async fn worker_status_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.registration {
        Some(registration) => Json(registration.status()).into_response(),
        None => offline_disabled(),
    }
}

fn offline_disabled() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Offline worker is disabled" })),
    )
        .into_response()
}

/// Everything else goes through the worker to the origin
async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(uri = %parts.uri, error = %e, "Rejected request body");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({
                    "error": "Request body too large",
                    "message": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    let url = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
    let fetch = FetchRequest {
        method: parts.method,
        url,
        headers: parts.headers,
        body,
    };

    let result = match &state.registration {
        Some(registration) => registration.fetch(fetch).await,
        None => state.network.fetch(&fetch).await,
    };

    match result {
        Ok(response) => response.into_response(),
        Err(e) => {
            warn!(error = %e, "Upstream unavailable");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Bad gateway",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::offline::CacheStorage;
    use crate::offline::testing::{StubNetwork, config as offline_config};
    use tower::ServiceExt;

    async fn app(network: Arc<StubNetwork>, offline: bool) -> Router {
        let mut config = Config::default();
        config.rate_limit = RateLimitConfig {
            enabled: true,
            requests_per_minute: 2,
        };

        let registration = if offline {
            let registration = Registration::new(
                Arc::new(CacheStorage::in_memory()),
                Arc::clone(&network) as Arc<dyn Network>,
            );
            registration
                .register(offline_config("v1", &["/", "/offline.html"]))
                .await
                .unwrap();
            Some(Arc::new(registration))
        } else {
            None
        };

        let state = Arc::new(AppState {
            registration,
            network,
            max_body_size: 1024,
        });
        let limiter = Arc::new(ApiRateLimiter::new(&config.rate_limit, &config.offline.api_prefix));
        create_router(state, &config, limiter)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_active_worker() {
        let app = app(Arc::new(StubNetwork::with_site()), true).await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["worker"], "v1");
    }

    #[tokio::test]
    async fn static_asset_gets_long_cache_headers() {
        let app = app(Arc::new(StubNetwork::with_site()), true).await;
        let response = app
            .oneshot(Request::get("/styles.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=86400");
    }

    #[tokio::test]
    async fn offline_api_is_503_and_no_store() {
        let network = Arc::new(StubNetwork::with_site());
        let app = app(Arc::clone(&network), true).await;
        network.set_offline(true);

        let response = app
            .oneshot(
                Request::post("/api/analyze")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(body_json(response).await["offline"], true);
    }

    #[tokio::test]
    async fn unreachable_static_without_fallback_is_502() {
        let network = Arc::new(StubNetwork::with_site());
        let app = app(Arc::clone(&network), false).await;
        network.set_offline(true);

        let response = app
            .oneshot(Request::get("/styles.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn worker_endpoints_when_disabled() {
        let app = app(Arc::new(StubNetwork::with_site()), false).await;
        let response = app
            .oneshot(Request::get("/__worker/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_worker_message_is_accepted() {
        let app = app(Arc::new(StubNetwork::with_site()), true).await;
        let response = app
            .oneshot(
                Request::post("/__worker/message")
                    .body(Body::from(r#"{"hello":"world"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = app(Arc::new(StubNetwork::with_site()), true).await;
        let response = app
            .oneshot(
                Request::post("/api/analyze")
                    .body(Body::from(vec![b'x'; 4096]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn api_posts_are_rate_limited() {
        let network = Arc::new(StubNetwork::with_site());
        network.route("/api/analyze", StatusCode::OK, r#"{"transactions":[],"whale_report":[]}"#);
        let app = app(network, true).await;

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(Request::post("/api/analyze").body(Body::from("{}")).unwrap())
                .await
                .unwrap();
            statuses.push(response.status());
        }

        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[tokio::test]
    async fn cors_preflight_for_allowed_origin() {
        let app = app(Arc::new(StubNetwork::with_site()), true).await;
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/analyze")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "86400");
    }
}
