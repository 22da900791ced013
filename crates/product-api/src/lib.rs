//! # Product Catalog API
//!
//! HTTP service for the product catalog.
//!
//! ## Features
//!
//! - **Cache-aside reads**: Redis first, then the replica, then the primary
//! - **Invalidating writes**: commit on the primary, then delete the cache key
//! - **Consistency probe**: measures replica lag around a write
//! - **Health**: cache reachability and replication role of both members
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Axum HTTP Server                         │
//! │        /products · /test-consistency · /health              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ApiContext                               │
//! │   (ProductRepository, ConsistencyProbe, HealthMonitor)      │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │     Redis Cache         │   │   PostgreSQL                 │
//! │  (advisory copies)      │   │   primary · replica          │
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod error;
pub mod routes;

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, ConfigError, LogFormat};
pub use context::ApiContext;
pub use error::{ApiError, ApiResult};

/// Build the Axum router
pub fn build_router(ctx: ApiContext, cors_origins: &[String]) -> Router {
    Router::new()
        .route(
            "/products",
            get(routes::list_products).post(routes::create_product),
        )
        .route(
            "/products/{id}",
            get(routes::get_product).put(routes::update_product),
        )
        .route("/test-consistency/{id}", post(routes::test_consistency))
        .route("/health", get(routes::health_check))
        .route("/", get(|| async { "Product Catalog API" }))
        .with_state(ctx)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
