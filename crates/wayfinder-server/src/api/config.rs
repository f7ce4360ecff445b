//! Configuration API endpoints.
//!
//! Provides endpoints for reading and replacing the engine configuration.
//! Changes apply to the next scan session and are saved to the configuration
//! file when the server was started with one.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use wayfinder_core::EngineConfig;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the config router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_config).put(update_config))
        .route("/reset", post(reset_config))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response after changing the configuration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateConfigResponse {
    /// Whether the update was successful.
    pub success: bool,

    /// Whether the change was written to the configuration file.
    pub saved: bool,

    /// Effective configuration after normalization.
    pub config: EngineConfig,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get current configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the effective engine configuration: scan period, proximity \
        thresholds, positioning pipeline switches, routing and ranging settings.",
    responses(
        (status = 200, description = "Configuration retrieved", body = EngineConfig)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<EngineConfig> {
    Json((*state.engine().config()).clone())
}

/// Replace the configuration.
#[utoipa::path(
    put,
    path = "/api/config",
    tag = "config",
    operation_id = "updateConfig",
    summary = "Update configuration",
    description = "Validates and replaces the engine configuration. A scan period below \
        the minimum is raised to it. The new values take effect when scanning is next \
        started.",
    request_body = EngineConfig,
    responses(
        (status = 200, description = "Configuration updated", body = UpdateConfigResponse),
        (status = 422, description = "Invalid configuration", body = super::error::ErrorResponse)
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    Json(config): Json<EngineConfig>,
) -> ApiResult<Json<UpdateConfigResponse>> {
    let engine = state.engine();
    engine.set_config(config)?;

    let effective = (*engine.config()).clone();
    let saved = save_config(&state, &effective)?;
    info!(saved, "Configuration updated");

    Ok(Json(UpdateConfigResponse {
        success: true,
        saved,
        config: effective,
    }))
}

/// Restore default configuration.
#[utoipa::path(
    post,
    path = "/api/config/reset",
    tag = "config",
    operation_id = "resetConfig",
    summary = "Reset configuration",
    description = "Stops scanning and restores the default configuration.",
    responses(
        (status = 200, description = "Defaults restored", body = UpdateConfigResponse),
        (status = 500, description = "Scan worker failed or save failed", body = super::error::ErrorResponse)
    )
)]
pub async fn reset_config(
    State(state): State<SharedState>,
) -> ApiResult<Json<UpdateConfigResponse>> {
    let engine = state.engine();
    engine.reset_to_default_values().await?;

    let effective = (*engine.config()).clone();
    let saved = save_config(&state, &effective)?;

    Ok(Json(UpdateConfigResponse {
        success: true,
        saved,
        config: effective,
    }))
}

/// Writes `config` to the server's configuration file, if it has one.
fn save_config(state: &SharedState, config: &EngineConfig) -> ApiResult<bool> {
    let Some(path) = state.config_path() else {
        return Ok(false);
    };

    config.save(path).map_err(|e| ApiError::InternalError {
        error_code: "config_save_failed".to_string(),
        message: "Failed to save configuration".to_string(),
        details: Some(e.to_string()),
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_config_response_serialization() {
        let response = UpdateConfigResponse {
            success: true,
            saved: false,
            config: EngineConfig::default(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"period_secs\":5.0"));
        assert!(json.contains("\"saved\":false"));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let json = r#"{"scan": {"period_secs": 3.0}}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert!((config.scan.period_secs - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.proximity, wayfinder_core::ProximityConfig::default());
    }
}
