//! Content catalog endpoints.
//!
//! The host pushes the catalog it synced; the engine validates it and swaps
//! it in atomically.

use axum::extract::State;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use wayfinder_core::{CatalogDocument, EngineState};

use crate::api::error::{ApiError, ApiResult};
use crate::api::status::CatalogSummary;
use crate::state::SharedState;

/// Creates the catalog router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", put(install_catalog).delete(clear_catalog))
        .route("/stale", post(mark_stale))
}

/// Response after a content change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CatalogStateResponse {
    /// Content state after the change.
    pub engine_state: EngineState,

    /// Installed catalog, if any.
    #[schema(nullable)]
    pub catalog: Option<CatalogSummary>,
}

/// Install a catalog.
#[utoipa::path(
    put,
    path = "/api/catalog",
    tag = "catalog",
    operation_id = "installCatalog",
    summary = "Install content catalog",
    description = "Validates and installs beacons, device actions and navigation waypoints. \
        A running scan session picks up the new catalog on its next cycle. An invalid \
        catalog leaves the current one in place.",
    request_body = CatalogDocument,
    responses(
        (status = 200, description = "Catalog installed", body = CatalogStateResponse),
        (status = 400, description = "Malformed beacon id", body = super::error::ErrorResponse),
        (status = 422, description = "Catalog failed validation", body = super::error::ErrorResponse)
    )
)]
pub async fn install_catalog(
    State(state): State<SharedState>,
    Json(document): Json<CatalogDocument>,
) -> ApiResult<Json<CatalogStateResponse>> {
    let engine = state.engine();
    let installed = engine.install_document(document)?;

    Ok(Json(CatalogStateResponse {
        engine_state: engine.state(),
        catalog: Some(CatalogSummary::of(&installed)),
    }))
}

/// Mark the installed catalog as stale.
#[utoipa::path(
    post,
    path = "/api/catalog/stale",
    tag = "catalog",
    operation_id = "markCatalogStale",
    summary = "Mark content stale",
    description = "Signals that content sync failed. The installed catalog stays usable \
        and the engine state moves from online to offline.",
    responses(
        (status = 200, description = "State updated", body = CatalogStateResponse)
    )
)]
pub async fn mark_stale(State(state): State<SharedState>) -> Json<CatalogStateResponse> {
    let engine = state.engine();
    engine.mark_content_stale();

    Json(CatalogStateResponse {
        engine_state: engine.state(),
        catalog: engine.catalog().as_deref().map(CatalogSummary::of),
    })
}

/// Clear cached content.
#[utoipa::path(
    delete,
    path = "/api/catalog",
    tag = "catalog",
    operation_id = "clearCatalog",
    summary = "Clear cached data",
    description = "Stops scanning and forgets the catalog and location history.",
    responses(
        (status = 200, description = "Content cleared", body = CatalogStateResponse),
        (status = 500, description = "Scan worker failed", body = super::error::ErrorResponse)
    )
)]
pub async fn clear_catalog(
    State(state): State<SharedState>,
) -> ApiResult<Json<CatalogStateResponse>> {
    let engine = state.engine();
    engine.clear_cached_data().await.map_err(ApiError::from)?;
    info!("Content cleared via API");

    Ok(Json(CatalogStateResponse {
        engine_state: engine.state(),
        catalog: None,
    }))
}
