//! Multi-floor indoor navigation.
//!
//! - [`graph`] - the authored waypoint graph, built once per catalog
//! - [`router`] - shortest-path search with synthetic start/destination nodes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::geo::IndoorPosition;

pub mod graph;
pub mod router;

pub use graph::{Connection, GraphError, GraphNode, WaypointGraph, WaypointRecord};
pub use router::shortest_route;

/// Errors surfaced by a routing request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NavigationError {
    /// The graph has no path between the requested floors.
    #[error("No route found from floor {from_floor} to floor {to_floor}")]
    NoPath {
        /// Floor of the start position.
        from_floor: i32,
        /// Floor of the destination.
        to_floor: i32,
    },

    /// No navigation data is available for the request.
    #[error("No navigation data: {0}")]
    NoData(String),

    /// The engine is not in a state that allows routing.
    #[error("Navigation unavailable in current state: {0}")]
    InvalidState(String),

    /// Anything else.
    #[error("Navigation failed: {0}")]
    Other(String),
}

impl NavigationError {
    /// Machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoPath { .. } => "NAVIGATION_NO_PATH",
            Self::NoData(_) => "NAVIGATION_NO_DATA",
            Self::InvalidState(_) => "NAVIGATION_INVALID_STATE",
            Self::Other(_) => "NAVIGATION_FAILED",
        }
    }
}

/// Result alias for routing.
pub type NavigationResult<T> = std::result::Result<T, NavigationError>;

/// A start/destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteRequest {
    /// Where the route starts.
    pub start: IndoorPosition,
    /// Where the route ends.
    pub destination: IndoorPosition,
}

/// One point of a computed route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Waypoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Floor number.
    pub floor: i32,
    /// Walking distance in meters to the next waypoint (0 for the last one).
    pub distance_to_next: f64,
    /// Authored waypoint id; `None` for the synthetic start/destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoint_id: Option<String>,
    /// Display name of the authored waypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Waypoint {
    /// The position of this waypoint.
    #[must_use]
    pub const fn position(&self) -> IndoorPosition {
        IndoorPosition::new(self.latitude, self.longitude, self.floor)
    }
}

/// Shortest walking route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NavigationRoute {
    /// Ordered waypoints, starting at the start and ending at the destination.
    pub waypoints: Vec<Waypoint>,
    /// Sum of all legs in meters.
    pub total_distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            NavigationError::NoPath {
                from_floor: 0,
                to_floor: 1,
            },
            NavigationError::NoData("x".into()),
            NavigationError::InvalidState("x".into()),
            NavigationError::Other("x".into()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(NavigationError::error_code).collect();
        codes.dedup();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn test_no_path_message_names_floors() {
        let err = NavigationError::NoPath {
            from_floor: 1,
            to_floor: 3,
        };
        assert!(err.to_string().contains("floor 1"));
        assert!(err.to_string().contains("floor 3"));
    }

    #[test]
    fn test_route_serde_keeps_waypoint_fields() {
        let route = NavigationRoute {
            waypoints: vec![
                Waypoint {
                    latitude: 48.137_154,
                    longitude: 11.576_124,
                    floor: 0,
                    distance_to_next: 7.25,
                    waypoint_id: None,
                    name: None,
                },
                Waypoint {
                    latitude: 48.137_2,
                    longitude: 11.576_2,
                    floor: 2,
                    distance_to_next: 0.0,
                    waypoint_id: Some("stairs-2".into()),
                    name: Some("Stairs".into()),
                },
            ],
            total_distance: 7.25,
        };

        let json = serde_json::to_value(&route).unwrap();
        assert!(json["waypoints"][0].get("waypoint_id").is_none());
        assert_eq!(json["waypoints"][1]["name"], "Stairs");

        let back: NavigationRoute = serde_json::from_value(json).unwrap();
        assert_eq!(back, route);
        assert_eq!(back.waypoints[1].position(), IndoorPosition::new(48.137_2, 11.576_2, 2));
    }
}
