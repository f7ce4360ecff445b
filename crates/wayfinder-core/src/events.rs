//! Engine events and the sink they are delivered through.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::catalog::{BeaconId, DeviceAction};
use crate::geo::Location;
use crate::navigation::{NavigationError, NavigationRoute};
use crate::proximity::ProximityBucket;

/// Everything the engine reports to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A beacon visit started.
    Entered {
        /// Beacon id.
        #[schema(value_type = String)]
        beacon: BeaconId,
        /// Bucket at entry.
        bucket: ProximityBucket,
        /// Cycle time.
        at: DateTime<Utc>,
    },
    /// A beacon visit ended.
    Exited {
        /// Beacon id.
        #[schema(value_type = String)]
        beacon: BeaconId,
        /// Cycle time.
        at: DateTime<Utc>,
    },
    /// An action's proximity trigger was satisfied.
    ActionTriggered {
        /// Beacon the action is bound to.
        #[schema(value_type = String)]
        beacon: BeaconId,
        /// Bucket that satisfied the trigger.
        bucket: ProximityBucket,
        /// The action.
        action: DeviceAction,
    },
    /// A new location was published.
    LocationUpdated {
        /// The location.
        location: Location,
    },
    /// Beacons were ranged but no new location was published.
    RangedNoFix {
        /// Number of catalog beacons heard this cycle.
        beacons: usize,
    },
    /// A routing request succeeded.
    RouteComputed {
        /// Request id returned by the engine.
        request_id: Uuid,
        /// The route.
        route: NavigationRoute,
    },
    /// A routing request failed.
    RouteFailed {
        /// Request id returned by the engine.
        request_id: Uuid,
        /// Why.
        error: NavigationError,
    },
    /// The radio became available or unavailable.
    BluetoothStateChanged {
        /// Whether scanning is possible.
        available: bool,
    },
    /// A new catalog was installed.
    ContentUpdated {
        /// Catalog version.
        version: u64,
    },
}

/// Receiver of engine events.
///
/// Implementations must not block; `emit` is called from the scan worker.
pub trait EventSink: Send + Sync + 'static {
    /// Delivers one event.
    fn emit(&self, event: EngineEvent);
}

impl EventSink for mpsc::UnboundedSender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        if self.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }
}

impl EventSink for broadcast::Sender<EngineEvent> {
    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.send(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}
