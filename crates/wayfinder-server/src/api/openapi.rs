//! OpenAPI specification generation for the wayfinder API.
//!
//! This module generates an OpenAPI 3.0 specification consumed by host
//! applications to generate typed clients. It is served at
//! `/api/openapi.json` next to the Swagger UI.

use utoipa::OpenApi;
use wayfinder_core::{
    Beacon, CatalogDocument, ComputedRoute, Coordinate, DeviceAction, EngineConfig, EngineEvent,
    EngineState, IndoorPosition, Location, NavigationConfig, NavigationError, NavigationRoute,
    OutdoorAccuracy, PositioningConfig, ProximityBucket, ProximityConfig, ProximityTrigger,
    RangingConfig, RouteRequest, ScanConfig, Waypoint, WaypointRecord,
};

use super::catalog::CatalogStateResponse;
use super::config::UpdateConfigResponse;
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::location::EventsResponse;
use super::scan::{ScanStateResponse, SubmitSamplesRequest, SubmitSamplesResponse};
use super::sensors::{MotionRequest, OutdoorResponse};
use super::status::{CatalogSummary, StatusResponse};
use crate::event_log::LoggedEvent;

/// Returns the OpenAPI specification as pretty-printed JSON.
/// Used by the gen-openapi binary.
///
/// # Errors
///
/// Returns an error if the specification cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for wayfinder.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "wayfinder API",
        version = "0.1.0",
        description = r#"
# wayfinder API

wayfinder turns Bluetooth beacon readings into proximity events, indoor locations and routes.

## Overview

1. **Content**: Install the catalog of beacons, device actions and waypoints (`PUT /api/catalog`)
2. **Scanning**: Start a scan session (`POST /api/scan/start`) and, when the server is not
   attached to a local adapter, submit beacon samples (`POST /api/scan/samples`)
3. **Positioning**: Read the current location (`GET /api/location`) or poll events
   (`GET /api/events`)
4. **Routing**: Compute routes across floors (`POST /api/navigation/route`)

## Events

Each scan cycle records proximity events first (`entered`, `action_triggered`, `exited`),
then at most one `location_updated` or `ranged_no_fix`.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local wayfinder server")
    ),
    tags(
        (name = "system", description = "Health checks and engine status"),
        (name = "catalog", description = "Content catalog installation and freshness"),
        (name = "scan", description = "Scan sessions and external beacon samples"),
        (name = "sensors", description = "Motion and outdoor location inputs"),
        (name = "location", description = "Current location and engine events"),
        (name = "navigation", description = "Shortest routes over the waypoint graph"),
        (name = "config", description = "Engine configuration")
    ),
    paths(
        // System endpoints
        super::health::health_check,
        super::status::get_status,
        // Catalog endpoints
        super::catalog::install_catalog,
        super::catalog::mark_stale,
        super::catalog::clear_catalog,
        // Scan endpoints
        super::scan::start_scan,
        super::scan::stop_scan,
        super::scan::submit_samples,
        // Sensor endpoints
        super::sensors::update_motion,
        super::sensors::update_outdoor,
        // Location endpoints
        super::location::get_location,
        super::location::get_events,
        // Navigation endpoints
        super::navigation::compute_route,
        // Config endpoints
        super::config::get_config,
        super::config::update_config,
        super::config::reset_config,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // System types
            HealthResponse,
            StatusResponse,
            CatalogSummary,
            EngineState,
            // Catalog types
            CatalogDocument,
            CatalogStateResponse,
            Beacon,
            DeviceAction,
            ProximityTrigger,
            WaypointRecord,
            // Scan types
            ScanStateResponse,
            SubmitSamplesRequest,
            SubmitSamplesResponse,
            // Sensor types
            MotionRequest,
            OutdoorResponse,
            // Location types
            Coordinate,
            IndoorPosition,
            Location,
            EngineEvent,
            ProximityBucket,
            LoggedEvent,
            EventsResponse,
            // Navigation types
            RouteRequest,
            ComputedRoute,
            NavigationRoute,
            Waypoint,
            NavigationError,
            // Config types
            EngineConfig,
            ScanConfig,
            ProximityConfig,
            PositioningConfig,
            NavigationConfig,
            RangingConfig,
            OutdoorAccuracy,
            UpdateConfigResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "wayfinder API");
        assert!(spec.paths.paths.contains_key("/api/navigation/route"));
        assert!(spec.paths.paths.contains_key("/health"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"wayfinder API\""));
        assert!(json.contains("\"EngineEvent\""));
    }
}
