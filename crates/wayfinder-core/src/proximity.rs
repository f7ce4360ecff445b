//! Per-beacon proximity tracking.
//!
//! Each cycle the aggregated readings are classified into distance buckets.
//! Crossing from `Outside` into any bucket opens a visit (`Entered`); a beacon
//! that stays unheard for `exit_after_missed_cycles` cycles closes it
//! (`Exited`). Actions fire at most once per visit, as soon as the beacon is
//! at least as close as the action's trigger.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::catalog::{BeaconId, CatalogSnapshot, ProximityTrigger};
use crate::config::ProximityConfig;
use crate::events::EngineEvent;
use crate::ranging::RangedBeacon;

/// Distance bucket of a beacon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProximityBucket {
    /// Not heard, or beyond the far threshold.
    #[default]
    Outside,
    /// Within the far threshold.
    Far,
    /// Within the near threshold.
    Near,
    /// Within the immediate threshold.
    Immediate,
}

impl ProximityBucket {
    /// Classifies a distance in meters.
    #[must_use]
    pub fn classify(distance: f64, config: &ProximityConfig) -> Self {
        if !distance.is_finite() || distance < 0.0 {
            Self::Outside
        } else if distance <= config.immediate_max_m {
            Self::Immediate
        } else if distance <= config.near_max_m {
            Self::Near
        } else if distance <= config.far_max_m {
            Self::Far
        } else {
            Self::Outside
        }
    }

    /// Converts a platform proximity code (0 unknown, 1 immediate, 2 near,
    /// 3 far). Anything else is treated as `Outside`.
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => Self::Outside,
            1 => Self::Immediate,
            2 => Self::Near,
            3 => Self::Far,
            other => {
                warn!(raw = other, "Unknown proximity value, treating as outside");
                Self::Outside
            }
        }
    }

    /// `true` for every bucket except `Outside`.
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Outside)
    }

    /// Whether an action with `trigger` fires in this bucket.
    #[must_use]
    pub const fn satisfies(self, trigger: ProximityTrigger) -> bool {
        match self {
            Self::Outside => false,
            Self::Immediate => true,
            Self::Near => matches!(trigger, ProximityTrigger::Near | ProximityTrigger::Far),
            Self::Far => matches!(trigger, ProximityTrigger::Far),
        }
    }
}

/// Tracked state of one beacon during a visit.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconProximityState {
    /// Beacon id.
    pub beacon: BeaconId,
    /// Current bucket.
    pub bucket: ProximityBucket,
    /// Last time a valid reading was seen.
    pub last_seen: DateTime<Utc>,
    /// Consecutive cycles without a valid reading.
    pub missed_cycles: u32,
    fired: HashSet<String>,
}

impl BeaconProximityState {
    /// Whether the action with `action_id` already fired during this visit.
    #[must_use]
    pub fn has_fired(&self, action_id: &str) -> bool {
        self.fired.contains(action_id)
    }
}

/// Proximity state table. Owned by the scan worker.
#[derive(Debug, Clone, Default)]
pub struct ProximityStateMachine {
    config: ProximityConfig,
    states: BTreeMap<BeaconId, BeaconProximityState>,
}

impl ProximityStateMachine {
    /// Creates an empty table.
    #[must_use]
    pub fn new(config: ProximityConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
        }
    }

    /// State of a beacon currently in a visit.
    #[must_use]
    pub fn state(&self, beacon: &BeaconId) -> Option<&BeaconProximityState> {
        self.states.get(beacon)
    }

    /// Number of beacons currently in a visit.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.states.len()
    }

    /// Forgets every beacon without emitting events.
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Applies one cycle of readings and returns the resulting events.
    ///
    /// Events are ordered by catalog position; per beacon `Entered` precedes
    /// its `ActionTriggered` events. Beacons that disappeared from the catalog
    /// are exited first.
    pub fn update(
        &mut self,
        ranged: &[RangedBeacon],
        catalog: &CatalogSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        let removed: Vec<BeaconId> = self
            .states
            .keys()
            .filter(|id| catalog.beacon(id).is_none())
            .copied()
            .collect();
        for beacon in removed {
            self.states.remove(&beacon);
            events.push(EngineEvent::Exited { beacon, at: now });
        }

        let readings: HashMap<BeaconId, &RangedBeacon> = ranged.iter().map(|r| (r.id, r)).collect();
        let exit_after = self.config.exit_after_missed_cycles.max(1);

        for beacon in catalog.beacons() {
            let id = beacon.id;
            let bucket = readings.get(&id).map_or(ProximityBucket::Outside, |r| {
                ProximityBucket::classify(r.distance, &self.config)
            });

            if bucket.is_present() {
                let last_seen = readings.get(&id).map_or(now, |r| r.last_seen);
                let state = self.states.entry(id).or_insert_with(|| {
                    debug!(beacon = %id, ?bucket, "Beacon entered");
                    events.push(EngineEvent::Entered {
                        beacon: id,
                        bucket,
                        at: now,
                    });
                    BeaconProximityState {
                        beacon: id,
                        bucket,
                        last_seen,
                        missed_cycles: 0,
                        fired: HashSet::new(),
                    }
                });
                state.bucket = bucket;
                state.last_seen = last_seen;
                state.missed_cycles = 0;

                for action in catalog.actions_for(&id) {
                    if bucket.satisfies(action.trigger) && state.fired.insert(action.id.clone()) {
                        events.push(EngineEvent::ActionTriggered {
                            beacon: id,
                            bucket,
                            action: action.clone(),
                        });
                    }
                }
            } else if let Some(state) = self.states.get_mut(&id) {
                state.missed_cycles += 1;
                if state.missed_cycles >= exit_after {
                    self.states.remove(&id);
                    debug!(beacon = %id, "Beacon exited");
                    events.push(EngineEvent::Exited { beacon: id, at: now });
                }
            }
        }

        events
    }
}
