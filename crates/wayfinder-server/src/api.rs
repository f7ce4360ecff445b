//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `catalog` - Content installation and freshness
//! - `config` - Engine configuration management
//! - `health` - Service health checks
//! - `location` - Current location and event polling
//! - `navigation` - Route computation
//! - `scan` - Scan sessions and external samples
//! - `sensors` - Motion and outdoor location inputs
//! - `status` - Engine status
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod catalog;
pub mod config;
pub mod error;
pub mod health;
pub mod location;
pub mod navigation;
pub mod openapi;
pub mod scan;
pub mod sensors;
pub mod status;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                  - Health check
/// /swagger-ui              - Interactive API documentation
/// /api
/// ├── /status              - Engine status
/// ├── /catalog             - Content install, stale marker, clear
/// ├── /scan                - Start, stop, external samples
/// ├── /motion              - Motion confidence
/// ├── /outdoor             - Outdoor location fix
/// ├── /location            - Last published location
/// ├── /events              - Event polling
/// ├── /navigation/route    - Route computation
/// ├── /config              - Configuration management
/// └── /openapi.json        - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", openapi::ApiDoc::openapi()))
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/status", get(status::get_status))
                .route("/location", get(location::get_location))
                .route("/events", get(location::get_events))
                .route("/navigation/route", post(navigation::compute_route))
                .nest("/catalog", catalog::router())
                .nest("/scan", scan::router())
                .nest("/config", config::router())
                .merge(sensors::router()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
