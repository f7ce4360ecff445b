//! Coordinates, locations and distance math.
//!
//! Everything in here is a pure function over value types. The only failure
//! mode is invalid input (NaN or out-of-range latitude/longitude) and, for
//! indoor comparisons, a floor mismatch when cross-floor distances are
//! disallowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Wire sentinel for "accuracy not estimated".
pub const UNKNOWN_ACCURACY: f64 = -1.0;

/// Errors produced by geo computations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// Latitude or longitude is NaN/infinite or outside its valid range.
    #[error("Invalid coordinate (latitude {latitude}, longitude {longitude})")]
    InvalidInput {
        /// Offending latitude.
        latitude: f64,
        /// Offending longitude.
        longitude: f64,
    },

    /// The two positions are on different floors and no cross-floor distance
    /// is defined by the active [`FloorPolicy`].
    #[error("No direct distance between floor {from} and floor {to}")]
    DifferentFloors {
        /// Floor of the first position.
        from: i32,
        /// Floor of the second position.
        to: i32,
    },
}

/// Result alias for geo computations.
pub type GeoResult<T> = std::result::Result<T, GeoError>;

/// How [`indoor_distance`] treats positions on different floors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FloorPolicy {
    /// Positions on different floors have no direct distance.
    #[default]
    Disallow,
    /// Add the given number of meters per floor of difference.
    Penalize(f64),
}

impl FloorPolicy {
    /// Builds a policy from an optional per-floor penalty.
    #[must_use]
    pub fn from_penalty(penalty_m: Option<f64>) -> Self {
        penalty_m.map_or(Self::Disallow, Self::Penalize)
    }
}

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    /// Latitude in degrees, -90..=90.
    #[schema(example = 52.520_008)]
    pub latitude: f64,
    /// Longitude in degrees, -180..=180.
    #[schema(example = 13.404_954)]
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate without validating it.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite and within range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Returns the coordinate if it is valid.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidInput`] for NaN or out-of-range values.
    pub fn validated(self) -> GeoResult<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(GeoError::InvalidInput {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// A coordinate on a specific floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IndoorPosition {
    /// Latitude in degrees.
    #[schema(example = 52.520_008)]
    pub latitude: f64,
    /// Longitude in degrees.
    #[schema(example = 13.404_954)]
    pub longitude: f64,
    /// Floor number (0 = ground floor).
    #[schema(example = 1)]
    pub floor: i32,
}

impl IndoorPosition {
    /// Creates an indoor position.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64, floor: i32) -> Self {
        Self {
            latitude,
            longitude,
            floor,
        }
    }

    /// The horizontal part of this position.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A location estimate, indoor or outdoor.
///
/// Indoor fixes carry a floor, outdoor fixes do not. `accuracy` is the
/// estimated radius in meters; `None` means it was not estimated (serialized
/// as `null`, and the legacy `-1` sentinel is accepted when reading).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    /// Latitude in degrees.
    #[schema(example = 52.520_008)]
    pub latitude: f64,
    /// Longitude in degrees.
    #[schema(example = 13.404_954)]
    pub longitude: f64,
    /// Estimated accuracy radius in meters.
    #[serde(default, with = "accuracy_serde")]
    #[schema(value_type = Option<f64>, example = 2.5)]
    pub accuracy: Option<f64>,
    /// When this location was computed.
    pub timestamp: DateTime<Utc>,
    /// Floor for indoor fixes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = 1)]
    pub floor: Option<i32>,
}

impl Location {
    /// An outdoor location with unknown accuracy, stamped now.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: Utc::now(),
            floor: None,
        }
    }

    /// An indoor location with unknown accuracy, stamped now.
    #[must_use]
    pub fn indoor(latitude: f64, longitude: f64, floor: i32) -> Self {
        Self {
            floor: Some(floor),
            ..Self::new(latitude, longitude)
        }
    }

    /// Sets the accuracy. Negative values mean "unknown".
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = (accuracy >= 0.0).then_some(accuracy);
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The horizontal part of this location.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Whether this location came from an indoor fix.
    #[must_use]
    pub const fn is_indoor(&self) -> bool {
        self.floor.is_some()
    }

    /// The indoor position, if this is an indoor fix.
    #[must_use]
    pub fn indoor_position(&self) -> Option<IndoorPosition> {
        self.floor
            .map(|floor| IndoorPosition::new(self.latitude, self.longitude, floor))
    }

    /// Great-circle distance to another location, ignoring floors.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidInput`] if either location is invalid.
    pub fn distance_to(&self, other: &Self) -> GeoResult<f64> {
        haversine_distance(self.coordinate(), other.coordinate())
    }
}

/// Great-circle distance in meters between two coordinates.
///
/// # Errors
///
/// Returns [`GeoError::InvalidInput`] if either coordinate is invalid.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> GeoResult<f64> {
    let a = a.validated()?;
    let b = b.validated()?;

    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    Ok(EARTH_RADIUS_M * c)
}

/// Distance in meters between two indoor positions.
///
/// Same floor: great-circle distance. Different floors: depends on `policy`.
///
/// # Errors
///
/// Returns [`GeoError::InvalidInput`] for invalid coordinates and
/// [`GeoError::DifferentFloors`] when floors differ under
/// [`FloorPolicy::Disallow`].
pub fn indoor_distance(
    a: &IndoorPosition,
    b: &IndoorPosition,
    policy: FloorPolicy,
) -> GeoResult<f64> {
    let horizontal = haversine_distance(a.coordinate(), b.coordinate())?;
    if a.floor == b.floor {
        return Ok(horizontal);
    }
    match policy {
        FloorPolicy::Disallow => Err(GeoError::DifferentFloors {
            from: a.floor,
            to: b.floor,
        }),
        FloorPolicy::Penalize(per_floor) => {
            let floors = f64::from(a.floor.abs_diff(b.floor));
            Ok(per_floor.mul_add(floors, horizontal))
        }
    }
}

/// Planar point in meters (east, north) relative to a [`LocalFrame`] origin.
pub type LocalPoint = (f64, f64);

/// Equirectangular projection around an origin.
///
/// Accurate to well under a centimeter over building-scale distances, which is
/// all fusion and snapping need.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: Coordinate,
    cos_lat: f64,
}

impl LocalFrame {
    /// Creates a frame centred on `origin`.
    #[must_use]
    pub fn new(origin: Coordinate) -> Self {
        Self {
            origin,
            cos_lat: origin.latitude.to_radians().cos(),
        }
    }

    /// Projects a coordinate into the frame.
    #[must_use]
    pub fn to_local(&self, c: Coordinate) -> LocalPoint {
        let x = (c.longitude - self.origin.longitude).to_radians() * EARTH_RADIUS_M * self.cos_lat;
        let y = (c.latitude - self.origin.latitude).to_radians() * EARTH_RADIUS_M;
        (x, y)
    }

    /// Maps a planar point back to a coordinate.
    #[must_use]
    pub fn to_geo(&self, (x, y): LocalPoint) -> Coordinate {
        let latitude = self.origin.latitude + (y / EARTH_RADIUS_M).to_degrees();
        let longitude = if self.cos_lat.abs() < f64::EPSILON {
            self.origin.longitude
        } else {
            self.origin.longitude + (x / (EARTH_RADIUS_M * self.cos_lat)).to_degrees()
        };
        Coordinate::new(latitude, longitude)
    }
}

/// Nearest point to `p` on segment `a`–`b`, and its squared distance to `p`.
#[must_use]
pub fn nearest_point_on_segment(p: LocalPoint, a: LocalPoint, b: LocalPoint) -> (LocalPoint, f64) {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx.mul_add(dx, dy * dy);
    let t = if len_sq <= f64::EPSILON {
        0.0
    } else {
        ((p.0 - a.0).mul_add(dx, (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let q = (t.mul_add(dx, a.0), t.mul_add(dy, a.1));
    let (ex, ey) = (p.0 - q.0, p.1 - q.1);
    (q, ex.mul_add(ex, ey * ey))
}

/// Serde adapter mapping the `-1` accuracy sentinel to `None`.
mod accuracy_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(accuracy: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match accuracy {
            Some(value) => serializer.serialize_some(value),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<f64>::deserialize(deserializer)?;
        Ok(raw.filter(|value| *value >= 0.0 && value.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} ± {tolerance}, got {actual}"
        );
    }

    #[test]
    fn test_haversine_one_degree_of_longitude_at_equator() {
        let d = haversine_distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0)).unwrap();
        assert_close(d, 111_195.08, 1.0);
    }

    #[test]
    fn test_haversine_is_symmetric_and_zero_on_identity() {
        let a = Coordinate::new(52.52, 13.405);
        let b = Coordinate::new(48.137, 11.575);
        let ab = haversine_distance(a, b).unwrap();
        let ba = haversine_distance(b, a).unwrap();
        assert_close(ab, ba, 1e-6);
        assert_close(haversine_distance(a, a).unwrap(), 0.0, 1e-9);
    }

    #[test]
    fn test_invalid_coordinates_are_rejected() {
        let ok = Coordinate::new(0.0, 0.0);
        for bad in [
            Coordinate::new(f64::NAN, 0.0),
            Coordinate::new(91.0, 0.0),
            Coordinate::new(0.0, -180.5),
            Coordinate::new(0.0, f64::INFINITY),
        ] {
            assert!(matches!(
                haversine_distance(ok, bad),
                Err(GeoError::InvalidInput { .. })
            ));
        }
    }

    #[test]
    fn test_indoor_distance_same_floor_matches_haversine() {
        let a = IndoorPosition::new(52.0, 13.0, 2);
        let b = IndoorPosition::new(52.0001, 13.0, 2);
        let expected = haversine_distance(a.coordinate(), b.coordinate()).unwrap();
        let d = indoor_distance(&a, &b, FloorPolicy::Disallow).unwrap();
        assert_close(d, expected, 1e-9);
    }

    #[test]
    fn test_indoor_distance_cross_floor_policies() {
        let a = IndoorPosition::new(52.0, 13.0, 0);
        let b = IndoorPosition::new(52.0, 13.0, 3);

        assert_eq!(
            indoor_distance(&a, &b, FloorPolicy::Disallow),
            Err(GeoError::DifferentFloors { from: 0, to: 3 })
        );
        let penalized = indoor_distance(&a, &b, FloorPolicy::Penalize(10.0)).unwrap();
        assert_close(penalized, 30.0, 1e-9);
    }

    #[test]
    fn test_location_accuracy_sentinel() {
        let json = r#"{"latitude":1.0,"longitude":2.0,"accuracy":-1,"timestamp":"2025-01-15T03:30:00Z"}"#;
        let location: Location = serde_json::from_str(json).unwrap();
        assert_eq!(location.accuracy, None);
        assert!(!location.is_indoor());

        let location = Location::indoor(1.0, 2.0, 4).with_accuracy(UNKNOWN_ACCURACY);
        assert_eq!(location.accuracy, None);
        assert_eq!(location.with_accuracy(3.5).accuracy, Some(3.5));
    }

    #[test]
    fn test_location_round_trip_keeps_floor() {
        let original = Location::indoor(52.5, 13.4, -1).with_accuracy(2.0);
        let json = serde_json::to_string(&original).unwrap();
        let back: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_local_frame_round_trip() {
        let frame = LocalFrame::new(Coordinate::new(52.52, 13.405));
        let target = Coordinate::new(52.5203, 13.4055);
        let local = frame.to_local(target);
        let back = frame.to_geo(local);
        assert_close(back.latitude, target.latitude, 1e-9);
        assert_close(back.longitude, target.longitude, 1e-9);

        let planar = local.0.hypot(local.1);
        let great_circle = haversine_distance(Coordinate::new(52.52, 13.405), target).unwrap();
        assert_close(planar, great_circle, 0.01);
    }

    #[test]
    fn test_nearest_point_on_segment_clamps_to_endpoints() {
        let (q, d2) = nearest_point_on_segment((5.0, 3.0), (0.0, 0.0), (10.0, 0.0));
        assert_eq!(q, (5.0, 0.0));
        assert_close(d2, 9.0, 1e-12);

        let (q, _) = nearest_point_on_segment((-4.0, 1.0), (0.0, 0.0), (10.0, 0.0));
        assert_eq!(q, (0.0, 0.0));

        let (q, _) = nearest_point_on_segment((1.0, 1.0), (2.0, 2.0), (2.0, 2.0));
        assert_eq!(q, (2.0, 2.0));
    }
}
