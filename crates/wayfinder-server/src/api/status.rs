//! Engine status endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use wayfinder_core::{EngineState, Location};

use crate::state::SharedState;

/// Engine status response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "engine_state": "online",
    "scanning": true,
    "catalog": {"version": 12, "beacons": 40, "actions": 5, "waypoints": 118},
    "last_location": null,
    "last_event_seq": 381,
    "uptime_secs": 3600
}))]
pub struct StatusResponse {
    /// Content state of the engine.
    pub engine_state: EngineState,

    /// Whether a scan session is running.
    #[schema(example = true)]
    pub scanning: bool,

    /// Installed catalog summary.
    #[schema(nullable)]
    pub catalog: Option<CatalogSummary>,

    /// Last published location.
    #[schema(nullable)]
    pub last_location: Option<Location>,

    /// Sequence number of the newest recorded event.
    #[schema(example = 381)]
    pub last_event_seq: u64,

    /// Server uptime in seconds.
    #[schema(example = 3600)]
    pub uptime_secs: u64,
}

/// Counts describing an installed catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CatalogSummary {
    /// Content version.
    #[schema(example = 12)]
    pub version: u64,

    /// Number of beacons.
    #[schema(example = 40)]
    pub beacons: usize,

    /// Number of device actions.
    #[schema(example = 5)]
    pub actions: usize,

    /// Number of navigation waypoints.
    #[schema(example = 118)]
    pub waypoints: usize,
}

impl CatalogSummary {
    /// Summarizes an installed snapshot.
    #[must_use]
    pub fn of(snapshot: &wayfinder_core::CatalogSnapshot) -> Self {
        Self {
            version: snapshot.version(),
            beacons: snapshot.beacons().len(),
            actions: snapshot.actions().len(),
            waypoints: snapshot.graph().node_count(),
        }
    }
}

/// Get engine status.
#[utoipa::path(
    get,
    path = "/api/status",
    tag = "system",
    operation_id = "getStatus",
    summary = "Get engine status",
    description = "Returns the content state, scan state, installed catalog summary \
        and the last published location.",
    responses(
        (status = 200, description = "Status retrieved", body = StatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let engine = state.engine();

    Json(StatusResponse {
        engine_state: engine.state(),
        scanning: engine.is_scanning(),
        catalog: engine.catalog().as_deref().map(CatalogSummary::of),
        last_location: engine.last_location(),
        last_event_seq: state.events().last_seq(),
        uptime_secs: state.uptime_secs(),
    })
}
