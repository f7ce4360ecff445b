//! Scan session endpoints.
//!
//! Also accepts raw beacon samples from an external scanner when the server
//! is not driving a local adapter.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use wayfinder_core::{BeaconSample, ScanError};

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the scan router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/start", post(start_scan))
        .route("/stop", post(stop_scan))
        .route("/samples", post(submit_samples))
}

/// Scan session state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"scanning": true}))]
pub struct ScanStateResponse {
    /// Whether a scan session is running.
    pub scanning: bool,
}

/// Batch of samples from an external scanner.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "samples": [
        {"beacon": "F7826DA6-4FA2-4E98-8024-BC5B71E0893E:100:1", "distance": 1.8},
        {"beacon": "F7826DA6-4FA2-4E98-8024-BC5B71E0893E:100:2", "rssi": -71}
    ],
    "bluetooth_available": true
}))]
pub struct SubmitSamplesRequest {
    /// Readings heard since the previous submission.
    #[serde(default)]
    pub samples: Vec<BeaconSample>,

    /// Radio availability reported by the scanner. Unchanged when omitted.
    pub bluetooth_available: Option<bool>,
}

/// Response after queuing samples.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitSamplesResponse {
    /// Number of samples queued for the next cycle.
    #[schema(example = 2)]
    pub accepted: usize,
}

/// Start scanning.
#[utoipa::path(
    post,
    path = "/api/scan/start",
    tag = "scan",
    operation_id = "startScan",
    summary = "Start scanning",
    description = "Starts a scan session. Proximity events and location updates are \
        produced once per scan period. Starting while already scanning does nothing.",
    responses(
        (status = 200, description = "Scanning", body = ScanStateResponse),
        (status = 409, description = "No catalog installed", body = super::error::ErrorResponse),
        (status = 503, description = "Bluetooth unavailable", body = super::error::ErrorResponse)
    )
)]
pub async fn start_scan(State(state): State<SharedState>) -> ApiResult<Json<ScanStateResponse>> {
    state.engine().start_scan().await?;
    Ok(Json(ScanStateResponse { scanning: true }))
}

/// Stop scanning.
#[utoipa::path(
    post,
    path = "/api/scan/stop",
    tag = "scan",
    operation_id = "stopScan",
    summary = "Stop scanning",
    description = "Stops the scan session. No further events from the session are \
        recorded once this returns.",
    responses(
        (status = 200, description = "Stopped", body = ScanStateResponse),
        (status = 500, description = "Scan worker failed", body = super::error::ErrorResponse)
    )
)]
pub async fn stop_scan(State(state): State<SharedState>) -> ApiResult<Json<ScanStateResponse>> {
    state.engine().stop_scan().await?;
    Ok(Json(ScanStateResponse { scanning: false }))
}

/// Submit beacon samples.
#[utoipa::path(
    post,
    path = "/api/scan/samples",
    tag = "scan",
    operation_id = "submitSamples",
    summary = "Submit beacon samples",
    description = "Queues readings from an external scanner for the next scan cycle. \
        Each sample needs a distance or an RSSI. Samples are only accepted while scanning; \
        anything still queued when a session starts or stops is discarded.",
    request_body = SubmitSamplesRequest,
    responses(
        (status = 200, description = "Samples queued", body = SubmitSamplesResponse),
        (status = 400, description = "Sample without distance or RSSI", body = super::error::ErrorResponse),
        (status = 409, description = "No scanning session is running", body = super::error::ErrorResponse),
        (status = 503, description = "Server scans a local adapter or the queue is full", body = super::error::ErrorResponse)
    )
)]
pub async fn submit_samples(
    State(state): State<SharedState>,
    Json(request): Json<SubmitSamplesRequest>,
) -> ApiResult<Json<SubmitSamplesResponse>> {
    let Some(feed) = state.scan_feed() else {
        return Err(ApiError::ServiceUnavailable {
            error_code: "scan_feed_unavailable".to_string(),
            message: "This server scans a local Bluetooth adapter and does not accept samples"
                .to_string(),
            details: None,
        });
    };

    if let Some(index) = request
        .samples
        .iter()
        .position(|s| s.distance.is_none() && s.rssi.is_none())
    {
        return Err(ApiError::BadRequest {
            error_code: "invalid_sample".to_string(),
            message: format!("Sample {index} has neither a distance nor an RSSI"),
        });
    }

    if let Some(available) = request.bluetooth_available {
        feed.set_bluetooth_available(available);
    }

    let accepted = request.samples.len();
    feed.push_all(request.samples).map_err(rejected_samples)?;
    debug!(accepted, "Samples queued");

    Ok(Json(SubmitSamplesResponse { accepted }))
}

fn rejected_samples(err: ScanError) -> ApiError {
    match err {
        ScanError::Inactive => ApiError::Conflict {
            error_code: "not_scanning".to_string(),
            message: "Start a scan session before submitting samples".to_string(),
        },
        ScanError::QueueFull => ApiError::ServiceUnavailable {
            error_code: "scan_queue_full".to_string(),
            message: "Too many samples are waiting for the next cycle".to_string(),
            details: None,
        },
        other => ApiError::ServiceUnavailable {
            error_code: "scan_feed_closed".to_string(),
            message: "Scan source is no longer receiving samples".to_string(),
            details: Some(other.to_string()),
        },
    }
}
