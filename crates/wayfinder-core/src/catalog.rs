//! Beacon/action/waypoint catalog and the atomic snapshot store.
//!
//! The catalog is produced by the content-sync collaborator and installed as a
//! whole. Readers grab an `Arc` to the snapshot that was current when they
//! started; a later install never mutates a snapshot someone is holding.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::geo::{Coordinate, IndoorPosition};
use crate::navigation::{GraphError, WaypointGraph, WaypointRecord};

static BEACON_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}):(\d{1,5}):(\d{1,5})$",
    )
    .expect("beacon id regex is valid")
});

/// Errors raised while building a catalog snapshot.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Two beacons share the same id.
    #[error("Duplicate beacon id: {0}")]
    DuplicateBeacon(BeaconId),

    /// Two actions share the same id.
    #[error("Duplicate action id: {0}")]
    DuplicateAction(String),

    /// An action is bound to a beacon that is not part of the catalog.
    #[error("Action '{action}' references unknown beacon {beacon}")]
    UnknownBeacon {
        /// Action id.
        action: String,
        /// Referenced beacon.
        beacon: BeaconId,
    },

    /// A navigation beacon has an invalid position.
    #[error("Beacon {0} is flagged for navigation but has an invalid position")]
    InvalidBeaconPosition(BeaconId),

    /// A beacon id string could not be parsed.
    #[error("Invalid beacon id '{0}'. Expected 'UUID:major:minor'.")]
    InvalidBeaconId(String),

    /// The waypoint graph is malformed.
    #[error("Invalid waypoint graph: {0}")]
    Graph(#[from] GraphError),
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Stable beacon identity: proximity UUID + major + minor.
///
/// Serialized as `"UUID:major:minor"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BeaconId {
    /// Proximity UUID.
    pub uuid: Uuid,
    /// Major value.
    pub major: u16,
    /// Minor value.
    pub minor: u16,
}

impl BeaconId {
    /// Creates a beacon id.
    #[must_use]
    pub const fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self { uuid, major, minor }
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.uuid.hyphenated().to_string().to_uppercase(),
            self.major,
            self.minor
        )
    }
}

impl FromStr for BeaconId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::InvalidBeaconId(s.to_string());
        let caps = BEACON_ID_REGEX.captures(s.trim()).ok_or_else(invalid)?;
        let uuid = Uuid::parse_str(&caps[1]).map_err(|_| invalid())?;
        let major = caps[2].parse::<u16>().map_err(|_| invalid())?;
        let minor = caps[3].parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(uuid, major, minor))
    }
}

impl TryFrom<String> for BeaconId {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BeaconId> for String {
    fn from(id: BeaconId) -> Self {
        id.to_string()
    }
}

/// Returns `true` if `s` is a valid `UUID:major:minor` beacon id.
#[must_use]
pub fn is_valid_beacon_id(s: &str) -> bool {
    s.parse::<BeaconId>().is_ok()
}

/// A fixed Bluetooth transmitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Beacon {
    /// Beacon identity.
    #[schema(value_type = String, example = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0:1:42")]
    pub id: BeaconId,

    /// Human-readable name.
    #[serde(default)]
    #[schema(example = "Entrance hall")]
    pub name: Option<String>,

    /// Device management code printed on the hardware.
    #[serde(default)]
    pub dmc: Option<String>,

    /// Latitude in degrees. Meaningful only for navigation beacons.
    #[serde(default)]
    pub latitude: f64,

    /// Longitude in degrees. Meaningful only for navigation beacons.
    #[serde(default)]
    pub longitude: f64,

    /// Floor number. Meaningful only for navigation beacons.
    #[serde(default)]
    pub floor: i32,

    /// Whether the beacon contributes to indoor positioning.
    #[serde(default)]
    pub use_for_indoor_navigation: bool,

    /// Calibrated RSSI at one meter, in dBm.
    #[serde(default)]
    #[schema(example = -59)]
    pub measured_power: Option<i8>,
}

impl Beacon {
    /// A beacon without a position.
    #[must_use]
    pub const fn new(id: BeaconId) -> Self {
        Self {
            id,
            name: None,
            dmc: None,
            latitude: 0.0,
            longitude: 0.0,
            floor: 0,
            use_for_indoor_navigation: false,
            measured_power: None,
        }
    }

    /// Flags the beacon for navigation at the given position.
    #[must_use]
    pub const fn positioned(mut self, latitude: f64, longitude: f64, floor: i32) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self.floor = floor;
        self.use_for_indoor_navigation = true;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Position used for positioning, if this is a navigation beacon.
    #[must_use]
    pub fn navigation_position(&self) -> Option<IndoorPosition> {
        self.use_for_indoor_navigation
            .then(|| IndoorPosition::new(self.latitude, self.longitude, self.floor))
    }
}

/// Distance level at which an action fires.
///
/// Ordered by increasing distance threshold: `Immediate < Near < Far`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ProximityTrigger {
    /// Within centimeters of the beacon.
    Immediate,
    /// Within a few meters.
    Near,
    /// Anywhere in radio range.
    Far,
}

/// A configured action bound to a beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceAction {
    /// Stable action id.
    #[schema(example = "welcome-coupon")]
    pub id: String,

    /// Action name.
    #[schema(example = "Welcome coupon")]
    pub name: String,

    /// Plain-text description.
    #[serde(default)]
    pub description: String,

    /// Opaque payload handed to the caller.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,

    /// Caller-defined action type.
    #[serde(default)]
    #[schema(example = "notification")]
    pub action_type: String,

    /// Caller-defined activity label.
    #[serde(default)]
    pub activity: Option<String>,

    /// Beacon this action is bound to.
    #[schema(value_type = String, example = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0:1:42")]
    pub beacon: BeaconId,

    /// Distance level that fires the action.
    pub trigger: ProximityTrigger,
}

/// Serialized catalog as delivered by content sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CatalogDocument {
    /// Monotonic content version.
    #[serde(default)]
    pub version: u64,

    /// All beacons of the sphere.
    #[serde(default)]
    pub beacons: Vec<Beacon>,

    /// All actions of the sphere.
    #[serde(default)]
    pub actions: Vec<DeviceAction>,

    /// Authored navigation waypoints.
    #[serde(default)]
    pub waypoints: Vec<WaypointRecord>,
}

/// Immutable, validated catalog.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    version: u64,
    installed_at: DateTime<Utc>,
    beacons: Vec<Beacon>,
    beacon_index: HashMap<BeaconId, usize>,
    actions: Vec<DeviceAction>,
    actions_by_beacon: HashMap<BeaconId, Vec<usize>>,
    graph: WaypointGraph,
}

impl CatalogSnapshot {
    /// Validates and indexes a catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] for duplicate ids, dangling action bindings
    /// or invalid navigation beacon positions.
    pub fn new(
        version: u64,
        beacons: Vec<Beacon>,
        actions: Vec<DeviceAction>,
        graph: WaypointGraph,
    ) -> CatalogResult<Self> {
        let mut beacon_index = HashMap::with_capacity(beacons.len());
        for (i, beacon) in beacons.iter().enumerate() {
            if beacon_index.insert(beacon.id, i).is_some() {
                return Err(CatalogError::DuplicateBeacon(beacon.id));
            }
            if beacon.use_for_indoor_navigation
                && !Coordinate::new(beacon.latitude, beacon.longitude).is_valid()
            {
                return Err(CatalogError::InvalidBeaconPosition(beacon.id));
            }
        }

        let mut seen_actions = HashSet::with_capacity(actions.len());
        let mut actions_by_beacon: HashMap<BeaconId, Vec<usize>> = HashMap::new();
        for (i, action) in actions.iter().enumerate() {
            if !seen_actions.insert(action.id.as_str()) {
                return Err(CatalogError::DuplicateAction(action.id.clone()));
            }
            if !beacon_index.contains_key(&action.beacon) {
                return Err(CatalogError::UnknownBeacon {
                    action: action.id.clone(),
                    beacon: action.beacon,
                });
            }
            actions_by_beacon.entry(action.beacon).or_default().push(i);
        }

        Ok(Self {
            version,
            installed_at: Utc::now(),
            beacons,
            beacon_index,
            actions,
            actions_by_beacon,
            graph,
        })
    }

    /// Builds a snapshot from its serialized form.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if validation or graph construction fails.
    pub fn from_document(document: CatalogDocument) -> CatalogResult<Self> {
        let graph = WaypointGraph::from_records(&document.waypoints)?;
        Self::new(document.version, document.beacons, document.actions, graph)
    }

    /// A snapshot with no content.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 0,
            installed_at: Utc::now(),
            beacons: Vec::new(),
            beacon_index: HashMap::new(),
            actions: Vec::new(),
            actions_by_beacon: HashMap::new(),
            graph: WaypointGraph::default(),
        }
    }

    /// Content version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// When the snapshot was built.
    #[must_use]
    pub const fn installed_at(&self) -> DateTime<Utc> {
        self.installed_at
    }

    /// All beacons in catalog order.
    #[must_use]
    pub fn beacons(&self) -> &[Beacon] {
        &self.beacons
    }

    /// All actions in catalog order.
    #[must_use]
    pub fn actions(&self) -> &[DeviceAction] {
        &self.actions
    }

    /// Looks up a beacon by id.
    #[must_use]
    pub fn beacon(&self, id: &BeaconId) -> Option<&Beacon> {
        self.beacon_index.get(id).map(|&i| &self.beacons[i])
    }

    /// Catalog position of a beacon, used for deterministic ordering.
    #[must_use]
    pub fn beacon_order(&self, id: &BeaconId) -> Option<usize> {
        self.beacon_index.get(id).copied()
    }

    /// Actions bound to a beacon, in catalog order.
    pub fn actions_for<'a>(&'a self, id: &BeaconId) -> impl Iterator<Item = &'a DeviceAction> + 'a {
        self.actions_by_beacon
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.actions[i])
    }

    /// The navigation graph.
    #[must_use]
    pub const fn graph(&self) -> &WaypointGraph {
        &self.graph
    }
}

/// Holder for the currently installed catalog snapshot.
///
/// Installs swap the whole `Arc` atomically; readers never observe a partially
/// updated catalog.
#[derive(Debug, Default)]
pub struct CatalogStore {
    current: ArcSwapOption<CatalogSnapshot>,
}

impl CatalogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, if one has been installed.
    #[must_use]
    pub fn load(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current.load_full()
    }

    /// Installs a new snapshot and returns it.
    pub fn install(&self, snapshot: CatalogSnapshot) -> Arc<CatalogSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(Arc::clone(&snapshot)));
        snapshot
    }

    /// Drops the current snapshot.
    pub fn clear(&self) {
        self.current.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "E2C56DB5-DFFB-48D2-B060-D0F5A71096E0";

    fn id(minor: u16) -> BeaconId {
        BeaconId::new(Uuid::parse_str(UUID).unwrap(), 1, minor)
    }

    fn action(action_id: &str, beacon: BeaconId, trigger: ProximityTrigger) -> DeviceAction {
        DeviceAction {
            id: action_id.to_string(),
            name: action_id.to_string(),
            description: String::new(),
            payload: serde_json::json!({"url": "https://example.com"}),
            action_type: "notification".to_string(),
            activity: None,
            beacon,
            trigger,
        }
    }

    #[test]
    fn test_beacon_id_parse_and_display() {
        let parsed: BeaconId = format!("{}:1:42", UUID.to_lowercase()).parse().unwrap();
        assert_eq!(parsed, id(42));
        assert_eq!(parsed.to_string(), format!("{UUID}:1:42"));
    }

    #[test]
    fn test_beacon_id_rejects_malformed_input() {
        assert!(!is_valid_beacon_id("not-a-beacon"));
        assert!(!is_valid_beacon_id(&format!("{UUID}:1")));
        assert!(!is_valid_beacon_id(&format!("{UUID}:70000:1")));
        assert!(is_valid_beacon_id(&format!("{UUID}:65535:0")));
    }

    #[test]
    fn test_beacon_round_trip_keeps_position_and_name() {
        let beacon = Beacon::new(id(7)).positioned(52.52, 13.405, 2).named("Lobby");
        let json = serde_json::to_string(&beacon).unwrap();
        assert!(json.contains(&format!("\"{UUID}:1:7\"")));
        let back: Beacon = serde_json::from_str(&json).unwrap();
        assert_eq!(back, beacon);
    }

    #[test]
    fn test_proximity_trigger_ordering() {
        assert!(ProximityTrigger::Immediate < ProximityTrigger::Near);
        assert!(ProximityTrigger::Near < ProximityTrigger::Far);
    }

    #[test]
    fn test_snapshot_indexes_actions_per_beacon() {
        let snapshot = CatalogSnapshot::new(
            3,
            vec![Beacon::new(id(1)), Beacon::new(id(2))],
            vec![
                action("a", id(1), ProximityTrigger::Far),
                action("b", id(2), ProximityTrigger::Near),
                action("c", id(1), ProximityTrigger::Immediate),
            ],
            WaypointGraph::default(),
        )
        .unwrap();

        let ids: Vec<&str> = snapshot.actions_for(&id(1)).map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(snapshot.actions_for(&id(3)).count(), 0);
        assert_eq!(snapshot.beacon_order(&id(2)), Some(1));
        assert_eq!(snapshot.version(), 3);
    }

    #[test]
    fn test_snapshot_validation_errors() {
        let duplicate = CatalogSnapshot::new(
            1,
            vec![Beacon::new(id(1)), Beacon::new(id(1))],
            Vec::new(),
            WaypointGraph::default(),
        );
        assert!(matches!(duplicate, Err(CatalogError::DuplicateBeacon(_))));

        let dangling = CatalogSnapshot::new(
            1,
            vec![Beacon::new(id(1))],
            vec![action("a", id(9), ProximityTrigger::Far)],
            WaypointGraph::default(),
        );
        assert!(matches!(dangling, Err(CatalogError::UnknownBeacon { .. })));

        let misplaced = CatalogSnapshot::new(
            1,
            vec![Beacon::new(id(1)).positioned(f64::NAN, 0.0, 0)],
            Vec::new(),
            WaypointGraph::default(),
        );
        assert!(matches!(misplaced, Err(CatalogError::InvalidBeaconPosition(_))));
    }

    #[test]
    fn test_store_swaps_snapshots_without_touching_readers() {
        let store = CatalogStore::new();
        assert!(store.load().is_none());

        store.install(CatalogSnapshot::new(1, vec![Beacon::new(id(1))], Vec::new(), WaypointGraph::default()).unwrap());
        let held = store.load().unwrap();

        store.install(CatalogSnapshot::empty());
        assert_eq!(held.version(), 1);
        assert_eq!(held.beacons().len(), 1);
        assert_eq!(store.load().unwrap().version(), 0);

        store.clear();
        assert!(store.load().is_none());
    }
}
