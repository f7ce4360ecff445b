//! Location and event polling endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use wayfinder_core::Location;

use crate::api::error::{ApiError, ApiResult};
use crate::event_log::LoggedEvent;
use crate::state::SharedState;

/// Query parameters for event polling.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventsQuery {
    /// Return events with a sequence number greater than this.
    #[param(example = 0)]
    #[serde(default)]
    pub since: u64,
}

/// Polled events.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventsResponse {
    /// Events in delivery order.
    pub events: Vec<LoggedEvent>,

    /// Pass as `since` on the next poll.
    #[schema(example = 42)]
    pub next: u64,
}

/// Get the last published location.
#[utoipa::path(
    get,
    path = "/api/location",
    tag = "location",
    operation_id = "getLocation",
    summary = "Get current location",
    description = "Returns the most recent location published by the positioning \
        pipeline. Indoor fixes carry a floor; outdoor fixes do not.",
    responses(
        (status = 200, description = "Location available", body = Location),
        (status = 404, description = "No location published yet", body = super::error::ErrorResponse)
    )
)]
pub async fn get_location(State(state): State<SharedState>) -> ApiResult<Json<Location>> {
    state
        .engine()
        .last_location()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound {
            error_code: "no_location".to_string(),
            message: "No location has been published yet".to_string(),
        })
}

/// Poll engine events.
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "location",
    operation_id = "getEvents",
    summary = "Poll engine events",
    description = "Returns proximity, location, routing and content events recorded \
        after `since`. Only the most recent events are retained.",
    params(EventsQuery),
    responses(
        (status = 200, description = "Events retrieved", body = EventsResponse)
    )
)]
pub async fn get_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let events = state.events().since(query.since);
    let next = events.last().map_or(query.since, |e| e.seq);

    Json(EventsResponse { events, next })
}
