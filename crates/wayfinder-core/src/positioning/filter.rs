//! Plausibility checks applied before a fix is published.

use crate::geo::Location;

/// Rejects fixes that would require walking faster than a speed limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceFilter {
    max_meters_per_second: f64,
}

impl DistanceFilter {
    /// Creates a filter with the given speed limit.
    #[must_use]
    pub const fn new(max_meters_per_second: f64) -> Self {
        Self {
            max_meters_per_second,
        }
    }

    /// Whether `candidate` is reachable from `last` in the elapsed time.
    ///
    /// Only horizontal distance counts. With no elapsed time any movement is
    /// rejected. Invalid coordinates are rejected.
    #[must_use]
    pub fn accepts(&self, last: &Location, candidate: &Location) -> bool {
        let Ok(distance) = last.distance_to(candidate) else {
            return false;
        };
        #[allow(clippy::cast_precision_loss)]
        let elapsed = (candidate.timestamp - last.timestamp).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return distance <= f64::EPSILON;
        }
        distance <= self.max_meters_per_second * elapsed
    }
}

/// Whether the device counts as stationary.
///
/// A missing reading counts as moving.
#[must_use]
pub fn is_stationary(confidence: Option<f64>, threshold: f64) -> bool {
    confidence.is_some_and(|c| c < threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_teleport_is_rejected() {
        let t0 = Utc::now();
        let last = Location::indoor(0.0, 0.0, 0).with_timestamp(t0);
        // ~200 m east
        let candidate = Location::indoor(0.0, 0.0018, 0).with_timestamp(t0 + Duration::seconds(1));
        assert!(!DistanceFilter::new(1.7).accepts(&last, &candidate));
    }

    #[test]
    fn test_walking_pace_is_accepted() {
        let t0 = Utc::now();
        let last = Location::indoor(0.0, 0.0, 0).with_timestamp(t0);
        // ~8 m in 5 s
        let candidate = Location::indoor(0.0, 0.000_072, 0).with_timestamp(t0 + Duration::seconds(5));
        assert!(DistanceFilter::new(1.7).accepts(&last, &candidate));
    }

    #[test]
    fn test_floor_is_ignored_and_zero_elapsed_rejects_movement() {
        let t0 = Utc::now();
        let last = Location::indoor(0.0, 0.0, 0).with_timestamp(t0);
        let upstairs = Location::indoor(0.0, 0.0, 3).with_timestamp(t0);
        assert!(DistanceFilter::new(1.7).accepts(&last, &upstairs));

        let moved = Location::indoor(0.0, 0.000_01, 0).with_timestamp(t0);
        assert!(!DistanceFilter::new(1.7).accepts(&last, &moved));
    }

    #[test]
    fn test_stationary_detection() {
        assert!(is_stationary(Some(0.01), 0.025));
        assert!(!is_stationary(Some(0.025), 0.025));
        assert!(!is_stationary(None, 0.025));
    }
}
