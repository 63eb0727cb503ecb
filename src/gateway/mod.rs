//! Gateway server implementation
//!
//! An axum reverse proxy hosting the offline worker in front of the
//! analysis origin.

pub mod headers;
pub mod rate_limit;
mod router;
mod server;

pub use headers::{CachePolicy, cache_headers_middleware};
pub use rate_limit::{ApiRateLimiter, rate_limit_middleware};
pub use router::{AppState, create_router};
pub use server::Gateway;
