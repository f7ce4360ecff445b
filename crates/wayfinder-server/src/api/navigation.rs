//! Routing endpoint.

use axum::extract::State;
use axum::Json;
use wayfinder_core::{ComputedRoute, RouteRequest};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Compute a route.
#[utoipa::path(
    post,
    path = "/api/navigation/route",
    tag = "navigation",
    operation_id = "computeRoute",
    summary = "Compute shortest route",
    description = "Computes the shortest walkable route between two indoor positions \
        over the installed waypoint graph, changing floors where the graph allows. \
        The first and last waypoints are the requested positions.",
    request_body = RouteRequest,
    responses(
        (status = 200, description = "Route found", body = ComputedRoute),
        (status = 404, description = "No path or no waypoints on a requested floor", body = super::error::ErrorResponse),
        (status = 409, description = "No catalog installed", body = super::error::ErrorResponse),
        (status = 500, description = "Invalid coordinates or routing failure", body = super::error::ErrorResponse)
    )
)]
pub async fn compute_route(
    State(state): State<SharedState>,
    Json(request): Json<RouteRequest>,
) -> ApiResult<Json<ComputedRoute>> {
    let route = state.engine().navigation_route(request).await?;
    Ok(Json(route))
}
