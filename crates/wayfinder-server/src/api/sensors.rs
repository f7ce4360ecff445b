//! Device sensor inputs: motion confidence and outdoor location fixes.

use axum::extract::State;
use axum::routing::put;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use wayfinder_core::{Location, OutdoorAccuracy};

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the sensors router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/motion", put(update_motion))
        .route("/outdoor", put(update_outdoor))
}

/// Motion detector reading.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"confidence": 0.4}))]
pub struct MotionRequest {
    /// Confidence that the device is moving, 0..=1. `null` clears the reading.
    #[schema(nullable, minimum = 0.0, maximum = 1.0)]
    pub confidence: Option<f64>,
}

/// Response after an outdoor fix is accepted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutdoorResponse {
    /// Accuracy the engine currently requests; `null` while the outdoor
    /// service is not in use.
    #[schema(nullable)]
    pub requested_accuracy: Option<OutdoorAccuracy>,
}

/// Update motion confidence.
#[utoipa::path(
    put,
    path = "/api/motion",
    tag = "sensors",
    operation_id = "updateMotion",
    summary = "Update motion confidence",
    description = "Sets the motion detector reading used to hold the location while \
        the device is stationary.",
    request_body = MotionRequest,
    responses(
        (status = 200, description = "Reading stored", body = MotionRequest),
        (status = 400, description = "Confidence out of range", body = super::error::ErrorResponse)
    )
)]
pub async fn update_motion(
    State(state): State<SharedState>,
    Json(request): Json<MotionRequest>,
) -> ApiResult<Json<MotionRequest>> {
    if let Some(confidence) = request.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ApiError::BadRequest {
                error_code: "invalid_motion_confidence".to_string(),
                message: "Motion confidence must be between 0 and 1".to_string(),
            });
        }
    }

    state.set_motion(request.confidence);
    Ok(Json(request))
}

/// Publish an outdoor location fix.
#[utoipa::path(
    put,
    path = "/api/outdoor",
    tag = "sensors",
    operation_id = "updateOutdoor",
    summary = "Publish outdoor location",
    description = "Provides the latest fix from the platform location service. It is \
        used only when outdoor positioning is enabled and no indoor fix is available.",
    request_body = Location,
    responses(
        (status = 200, description = "Fix stored", body = OutdoorResponse),
        (status = 400, description = "Invalid coordinate", body = super::error::ErrorResponse)
    )
)]
pub async fn update_outdoor(
    State(state): State<SharedState>,
    Json(location): Json<Location>,
) -> ApiResult<Json<OutdoorResponse>> {
    location.coordinate().validated()?;

    let outdoor = state.outdoor();
    outdoor.publish(location);

    Ok(Json(OutdoorResponse {
        requested_accuracy: outdoor.requested_accuracy(),
    }))
}
