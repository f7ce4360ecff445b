//! # wayfinder-core
//!
//! Core engine for beacon-based indoor positioning and wayfinding.
//!
//! This crate provides:
//! - Proximity tracking for catalog beacons with enter/exit/action events
//! - Location fusion from ranged beacons with smoothing and outdoor fallback
//! - Shortest-path routing over a multi-floor waypoint graph
//! - Configuration management and hot-swappable content catalogs
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`geo`] - Coordinates, distances and local projections
//! - [`catalog`] - Beacons, device actions and the content snapshot
//! - [`ranging`] - Per-cycle aggregation of raw beacon samples
//! - [`proximity`] - Proximity bucket state machine
//! - [`positioning`] - Location fusion pipeline
//! - [`navigation`] - Waypoint graph and shortest-path routing
//! - [`sources`] - Scan, motion and outdoor location inputs
//! - [`events`] - Events delivered to the host
//! - [`worker`] - The per-session scan cycle
//! - [`engine`] - Lifecycle facade tying the pieces together
//! - [`config`] - Engine configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - `bluetooth` - BlueZ scan source (requires the `bluetooth` feature)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod navigation;
pub mod positioning;
pub mod proximity;
pub mod ranging;
pub mod sources;
pub mod worker;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::BlueZScanner;
pub use catalog::{
    is_valid_beacon_id, Beacon, BeaconId, CatalogDocument, CatalogError, CatalogSnapshot,
    CatalogStore, DeviceAction, ProximityTrigger,
};
pub use config::{
    ConfigError, ConfigResult, EngineConfig, NavigationConfig, OutdoorAccuracy,
    PositioningConfig, ProximityConfig, RangingConfig, ScanConfig,
};
pub use engine::{
    ComputedRoute, Engine, EngineBuilder, EngineError, EngineResult, EngineState, SDK_VERSION,
};
pub use error::{Error, Result, WayfinderError};
pub use events::{EngineEvent, EventSink, NullSink};
pub use geo::{haversine_distance, indoor_distance, Coordinate, FloorPolicy, GeoError, IndoorPosition, Location};
pub use navigation::{
    shortest_route, NavigationError, NavigationResult, NavigationRoute, RouteRequest, Waypoint,
    WaypointGraph, WaypointRecord,
};
pub use proximity::{ProximityBucket, ProximityStateMachine};
pub use ranging::{BeaconSample, RangedBeacon, ScanBatch};
pub use sources::{
    ChannelScanSource, MotionSource, NoMotion, NoOutdoor, OutdoorFeed, OutdoorLocationSource,
    ScanError, ScanFeed, ScanSource, WatchMotionSource, WatchOutdoorSource,
};
