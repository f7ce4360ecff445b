//! Raw scan samples and their per-cycle aggregation.
//!
//! A scan layer delivers one [`ScanBatch`] per cycle. [`aggregate_cycle`]
//! turns it into one [`RangedBeacon`] per catalog beacon that was heard,
//! which is what the proximity state machine and the positioner consume.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::catalog::{BeaconId, CatalogSnapshot};
use crate::config::RangingConfig;

/// Bluetooth SIG company identifier used by iBeacon advertisements.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

const IBEACON_TYPE: u8 = 0x02;
const IBEACON_LENGTH: u8 = 0x15;

/// A single range reading for one beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BeaconSample {
    /// Beacon that was heard.
    #[schema(value_type = String, example = "F7826DA6-4FA2-4E98-8024-BC5B71E0893E:100:1")]
    pub beacon: BeaconId,
    /// Distance estimate in meters, if the scan layer provides one.
    #[serde(default)]
    pub distance: Option<f64>,
    /// Received signal strength in dBm.
    #[serde(default)]
    pub rssi: Option<i16>,
    /// When the reading was taken.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl BeaconSample {
    /// A sample with a distance estimate, stamped now.
    #[must_use]
    pub fn with_distance(beacon: BeaconId, distance: f64) -> Self {
        Self {
            beacon,
            distance: Some(distance),
            rssi: None,
            timestamp: Utc::now(),
        }
    }

    /// A sample with only an RSSI reading, stamped now.
    #[must_use]
    pub fn with_rssi(beacon: BeaconId, rssi: i16) -> Self {
        Self {
            beacon,
            distance: None,
            rssi: Some(rssi),
            timestamp: Utc::now(),
        }
    }
}

/// Everything the scan layer heard during one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScanBatch {
    /// Individual readings, possibly several per beacon.
    pub samples: Vec<BeaconSample>,
    /// Whether the radio was usable during this cycle.
    pub bluetooth_available: bool,
    /// When the batch was closed.
    pub collected_at: DateTime<Utc>,
}

impl ScanBatch {
    /// A batch from an available radio, stamped now.
    #[must_use]
    pub fn new(samples: Vec<BeaconSample>) -> Self {
        Self {
            samples,
            bluetooth_available: true,
            collected_at: Utc::now(),
        }
    }

    /// An empty batch from an unavailable radio.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            samples: Vec::new(),
            bluetooth_available: false,
            collected_at: Utc::now(),
        }
    }
}

/// Aggregated reading for one catalog beacon in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RangedBeacon {
    /// Beacon id.
    pub id: BeaconId,
    /// Mean of the cycle's valid distances, in meters.
    pub distance: f64,
    /// Number of readings averaged.
    pub readings: usize,
    /// Latest reading timestamp.
    pub last_seen: DateTime<Utc>,
}

/// Log-distance path-loss model: `10 ^ ((measured_power - rssi) / (10 n))`.
///
/// Returns `None` for non-negative RSSI (which scan layers use for "unknown")
/// or a non-positive exponent.
#[must_use]
pub fn rssi_to_distance(rssi: i16, measured_power: i8, path_loss_exponent: f64) -> Option<f64> {
    if rssi >= 0 || path_loss_exponent.is_nan() || path_loss_exponent <= 0.0 {
        return None;
    }
    let exponent = (f64::from(measured_power) - f64::from(rssi)) / (10.0 * path_loss_exponent);
    Some(10f64.powf(exponent))
}

fn sample_distance(sample: &BeaconSample, measured_power: i8, config: &RangingConfig) -> Option<f64> {
    let distance = match (sample.distance, sample.rssi) {
        (Some(d), _) => Some(d),
        (None, Some(rssi)) => rssi_to_distance(rssi, measured_power, config.path_loss_exponent),
        (None, None) => None,
    };
    distance.filter(|d| d.is_finite() && *d >= 0.0)
}

/// Aggregates a batch into one reading per catalog beacon, in catalog order.
///
/// Samples for unknown beacons, from filtered-out proximity UUIDs, or with
/// no usable distance are dropped.
#[must_use]
pub fn aggregate_cycle(
    batch: &ScanBatch,
    catalog: &CatalogSnapshot,
    config: &RangingConfig,
    proximity_uuids: &[Uuid],
) -> Vec<RangedBeacon> {
    let mut acc: BTreeMap<usize, (f64, RangedBeacon)> = BTreeMap::new();

    for sample in &batch.samples {
        if !proximity_uuids.is_empty() && !proximity_uuids.contains(&sample.beacon.uuid) {
            continue;
        }
        let (Some(order), Some(beacon)) = (
            catalog.beacon_order(&sample.beacon),
            catalog.beacon(&sample.beacon),
        ) else {
            continue;
        };
        let measured_power = beacon.measured_power.unwrap_or(config.default_measured_power);
        let Some(distance) = sample_distance(sample, measured_power, config) else {
            debug!(
                beacon = %sample.beacon,
                distance = ?sample.distance,
                rssi = ?sample.rssi,
                "Dropping malformed sample"
            );
            continue;
        };

        acc.entry(order)
            .and_modify(|(sum, ranged)| {
                *sum += distance;
                ranged.readings += 1;
                ranged.last_seen = ranged.last_seen.max(sample.timestamp);
            })
            .or_insert_with(|| {
                (
                    distance,
                    RangedBeacon {
                        id: sample.beacon,
                        distance,
                        readings: 1,
                        last_seen: sample.timestamp,
                    },
                )
            });
    }

    acc.into_values()
        .map(|(sum, mut ranged)| {
            #[allow(clippy::cast_precision_loss)]
            let n = ranged.readings as f64;
            ranged.distance = sum / n;
            ranged
        })
        .collect()
}

/// Decoded iBeacon advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IBeaconAdvertisement {
    /// Beacon identity.
    pub id: BeaconId,
    /// Calibrated RSSI at one meter.
    pub measured_power: i8,
}

/// Parses the manufacturer-specific payload of an Apple advertisement
/// (the bytes following the company id).
#[must_use]
pub fn parse_ibeacon(data: &[u8]) -> Option<IBeaconAdvertisement> {
    if data.len() < 23 || data[0] != IBEACON_TYPE || data[1] != IBEACON_LENGTH {
        return None;
    }
    let uuid = Uuid::from_slice(&data[2..18]).ok()?;
    let major = u16::from_be_bytes([data[18], data[19]]);
    let minor = u16::from_be_bytes([data[20], data[21]]);
    let measured_power = i8::from_be_bytes([data[22]]);
    Some(IBeaconAdvertisement {
        id: BeaconId::new(uuid, major, minor),
        measured_power,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Beacon;
    use crate::navigation::WaypointGraph;

    const UUID_A: Uuid = Uuid::from_u128(0xF782_6DA6_4FA2_4E98_8024_BC5B_71E0_893E);
    const UUID_B: Uuid = Uuid::from_u128(0x1111_2222_3333_4444_5555_6666_7777_8888);

    fn catalog() -> CatalogSnapshot {
        let mut loud = Beacon::new(BeaconId::new(UUID_A, 1, 2));
        loud.measured_power = Some(-50);
        CatalogSnapshot::new(
            1,
            vec![
                Beacon::new(BeaconId::new(UUID_A, 1, 1)),
                loud,
                Beacon::new(BeaconId::new(UUID_B, 9, 9)),
            ],
            Vec::new(),
            WaypointGraph::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_rssi_to_distance_model() {
        let d = rssi_to_distance(-59, -59, 2.0).unwrap();
        assert!((d - 1.0).abs() < 1e-9);
        let d = rssi_to_distance(-79, -59, 2.0).unwrap();
        assert!((d - 10.0).abs() < 1e-9);
        assert_eq!(rssi_to_distance(0, -59, 2.0), None);
        assert_eq!(rssi_to_distance(-70, -59, 0.0), None);
        assert_eq!(rssi_to_distance(-70, -59, -1.5), None);
        assert_eq!(rssi_to_distance(-70, -59, f64::NAN), None);
    }

    #[test]
    fn test_aggregate_averages_and_orders_by_catalog() {
        let catalog = catalog();
        let batch = ScanBatch::new(vec![
            BeaconSample::with_distance(BeaconId::new(UUID_B, 9, 9), 4.0),
            BeaconSample::with_distance(BeaconId::new(UUID_A, 1, 1), 1.0),
            BeaconSample::with_distance(BeaconId::new(UUID_A, 1, 1), 3.0),
            BeaconSample::with_distance(BeaconId::new(UUID_A, 7, 7), 1.0),
        ]);

        let ranged = aggregate_cycle(&batch, &catalog, &RangingConfig::default(), &[]);
        assert_eq!(ranged.len(), 2);
        assert_eq!(ranged[0].id, BeaconId::new(UUID_A, 1, 1));
        assert_eq!(ranged[0].readings, 2);
        assert!((ranged[0].distance - 2.0).abs() < 1e-9);
        assert_eq!(ranged[1].id, BeaconId::new(UUID_B, 9, 9));
    }

    #[test]
    fn test_aggregate_drops_malformed_and_filtered_samples() {
        let catalog = catalog();
        let batch = ScanBatch::new(vec![
            BeaconSample::with_distance(BeaconId::new(UUID_A, 1, 1), -1.0),
            BeaconSample::with_distance(BeaconId::new(UUID_A, 1, 1), f64::NAN),
            BeaconSample::with_rssi(BeaconId::new(UUID_A, 1, 1), 0),
            BeaconSample::with_distance(BeaconId::new(UUID_B, 9, 9), 2.0),
        ]);

        assert_eq!(
            aggregate_cycle(&batch, &catalog, &RangingConfig::default(), &[]).len(),
            1
        );
        assert!(aggregate_cycle(&batch, &catalog, &RangingConfig::default(), &[UUID_A]).is_empty());
    }

    #[test]
    fn test_aggregate_uses_beacon_measured_power() {
        let catalog = catalog();
        let batch = ScanBatch::new(vec![
            BeaconSample::with_rssi(BeaconId::new(UUID_A, 1, 1), -59),
            BeaconSample::with_rssi(BeaconId::new(UUID_A, 1, 2), -70),
        ]);

        let ranged = aggregate_cycle(&batch, &catalog, &RangingConfig::default(), &[]);
        assert!((ranged[0].distance - 1.0).abs() < 1e-9);
        assert!((ranged[1].distance - 10f64.powf(20.0 / 20.0)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_ibeacon() {
        let mut data = vec![0x02, 0x15];
        data.extend_from_slice(UUID_A.as_bytes());
        data.extend_from_slice(&[0x00, 0x64, 0x00, 0x01, 0xC5]);

        let adv = parse_ibeacon(&data).unwrap();
        assert_eq!(adv.id, BeaconId::new(UUID_A, 100, 1));
        assert_eq!(adv.measured_power, -59);

        assert_eq!(parse_ibeacon(&data[..20]), None);
        data[0] = 0x03;
        assert_eq!(parse_ibeacon(&data), None);
    }
}
