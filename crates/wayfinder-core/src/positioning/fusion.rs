//! Multi-beacon position estimate.

use std::collections::BTreeMap;

use crate::catalog::CatalogSnapshot;
use crate::geo::{IndoorPosition, LocalFrame};
use crate::ranging::RangedBeacon;

/// Distances below this are clamped before weighting.
pub const MIN_WEIGHT_DISTANCE_M: f64 = 0.1;

/// Raw indoor estimate for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateFix {
    /// Estimated position.
    pub position: IndoorPosition,
    /// Weighted mean distance of the contributing beacons, in meters.
    pub accuracy: f64,
    /// Number of beacons that contributed.
    pub contributors: usize,
}

struct Contributor {
    position: IndoorPosition,
    distance: f64,
}

/// Weighted centroid of the navigation beacons heard this cycle.
///
/// The floor is the most common floor among the beacons; on a tie the floor
/// of the closest tied beacon wins. Only beacons on that floor contribute to
/// the coordinate, each weighted by `1 / max(distance, 0.1)`.
#[must_use]
pub fn fuse(ranged: &[RangedBeacon], catalog: &CatalogSnapshot) -> Option<CandidateFix> {
    let contributors: Vec<Contributor> = ranged
        .iter()
        .filter_map(|r| {
            let position = catalog.beacon(&r.id)?.navigation_position()?;
            (position.coordinate().is_valid() && r.distance.is_finite() && r.distance >= 0.0).then_some(
                Contributor {
                    position,
                    distance: r.distance,
                },
            )
        })
        .collect();

    let floor = mode_floor(&contributors)?;
    let on_floor: Vec<&Contributor> = contributors
        .iter()
        .filter(|c| c.position.floor == floor)
        .collect();

    let frame = LocalFrame::new(on_floor[0].position.coordinate());
    let (mut sx, mut sy, mut sw, mut sd) = (0.0, 0.0, 0.0, 0.0);
    for c in &on_floor {
        let w = 1.0 / c.distance.max(MIN_WEIGHT_DISTANCE_M);
        let (x, y) = frame.to_local(c.position.coordinate());
        sx += w * x;
        sy += w * y;
        sd += w * c.distance;
        sw += w;
    }

    let coordinate = frame.to_geo((sx / sw, sy / sw));
    Some(CandidateFix {
        position: IndoorPosition::new(coordinate.latitude, coordinate.longitude, floor),
        accuracy: sd / sw,
        contributors: on_floor.len(),
    })
}

fn mode_floor(contributors: &[Contributor]) -> Option<i32> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for c in contributors {
        *counts.entry(c.position.floor).or_default() += 1;
    }
    let best = counts.values().copied().max()?;

    contributors
        .iter()
        .filter(|c| counts.get(&c.position.floor) == Some(&best))
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
        .map(|c| c.position.floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Beacon, BeaconId};
    use crate::navigation::WaypointGraph;
    use chrono::Utc;
    use uuid::Uuid;

    fn id(minor: u16) -> BeaconId {
        BeaconId::new(Uuid::nil(), 7, minor)
    }

    fn catalog(beacons: Vec<Beacon>) -> CatalogSnapshot {
        CatalogSnapshot::new(1, beacons, Vec::new(), WaypointGraph::default()).unwrap()
    }

    fn reading(minor: u16, distance: f64) -> RangedBeacon {
        RangedBeacon {
            id: id(minor),
            distance,
            readings: 1,
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn test_equal_distances_give_centroid() {
        let catalog = catalog(vec![
            Beacon::new(id(1)).positioned(0.0, 0.0, 1),
            Beacon::new(id(2)).positioned(0.0, 0.0002, 1),
        ]);
        let fix = fuse(&[reading(1, 2.0), reading(2, 2.0)], &catalog).unwrap();
        assert!(fix.position.latitude.abs() < 1e-9);
        assert!((fix.position.longitude - 0.0001).abs() < 1e-9);
        assert_eq!(fix.position.floor, 1);
        assert!((fix.accuracy - 2.0).abs() < 1e-9);
        assert_eq!(fix.contributors, 2);
    }

    #[test]
    fn test_closer_beacon_dominates() {
        let catalog = catalog(vec![
            Beacon::new(id(1)).positioned(0.0, 0.0, 0),
            Beacon::new(id(2)).positioned(0.0, 0.0003, 0),
        ]);
        let fix = fuse(&[reading(1, 1.0), reading(2, 3.0)], &catalog).unwrap();
        // weights 1 and 1/3
        assert!((fix.position.longitude - 0.000_075).abs() < 1e-9);
    }

    #[test]
    fn test_floor_mode_and_tie_break() {
        let catalog = catalog(vec![
            Beacon::new(id(1)).positioned(0.0, 0.0, 0),
            Beacon::new(id(2)).positioned(0.0, 0.0001, 0),
            Beacon::new(id(3)).positioned(0.0, 0.0, 1),
            Beacon::new(id(4)).positioned(0.0, 0.0001, 1),
            Beacon::new(id(5)).positioned(0.0, 0.0, 2),
        ]);

        let majority = fuse(&[reading(1, 5.0), reading(2, 5.0), reading(5, 0.2)], &catalog).unwrap();
        assert_eq!(majority.position.floor, 0);
        assert_eq!(majority.contributors, 2);

        let tie = fuse(
            &[reading(1, 4.0), reading(2, 4.0), reading(3, 3.0), reading(4, 9.0), reading(5, 0.5)],
            &catalog,
        )
        .unwrap();
        assert_eq!(tie.position.floor, 1);
    }

    #[test]
    fn test_non_navigation_beacons_are_ignored() {
        let catalog = catalog(vec![
            Beacon::new(id(1)),
            Beacon::new(id(2)).positioned(10.0, 10.0, 3),
        ]);
        assert!(fuse(&[reading(1, 1.0)], &catalog).is_none());

        let fix = fuse(&[reading(1, 0.1), reading(2, 8.0)], &catalog).unwrap();
        assert_eq!(fix.position.floor, 3);
        assert!((fix.position.latitude - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_distance_is_clamped() {
        let catalog = catalog(vec![
            Beacon::new(id(1)).positioned(0.0, 0.0, 0),
            Beacon::new(id(2)).positioned(0.0, 0.0001, 0),
        ]);
        let fix = fuse(&[reading(1, 0.0), reading(2, 0.1)], &catalog).unwrap();
        assert!((fix.position.longitude - 0.000_05).abs() < 1e-9);
    }
}
