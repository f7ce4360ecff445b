//! Location fusion pipeline.
//!
//! One call to [`Positioner::process`] per scan cycle:
//!
//! 1. [`fusion`] - weighted candidate fix from navigation beacons
//! 2. [`window`] - optional smoothing over the last accepted fixes
//! 3. [`filter`] - distance filter, then motion gate
//! 4. [`snapping`] - optional projection onto the waypoint graph
//! 5. outdoor fallback when indoor positioning has been silent for a while
//!
//! The positioner never fails; it either publishes a location or withholds one.

pub mod filter;
pub mod fusion;
pub mod snapping;
pub mod window;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::catalog::CatalogSnapshot;
use crate::config::PositioningConfig;
use crate::geo::Location;
use crate::ranging::RangedBeacon;

pub use filter::{is_stationary, DistanceFilter};
pub use fusion::{fuse, CandidateFix};
pub use snapping::snap_to_graph;
pub use window::SlidingWindow;

/// Result of one positioning cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A new location was accepted.
    Published(Location),
    /// Beacons were heard but no location was published.
    RangedNoFix,
    /// Nothing was heard and nothing was published.
    Idle,
}

/// Everything one cycle sees.
#[derive(Debug, Clone, Copy)]
pub struct CycleInput<'a> {
    /// Aggregated readings of catalog beacons.
    pub ranged: &'a [RangedBeacon],
    /// Catalog the readings were resolved against.
    pub catalog: &'a CatalogSnapshot,
    /// Device motion confidence.
    pub motion: Option<f64>,
    /// Latest outdoor fix.
    pub outdoor: Option<&'a Location>,
    /// Cycle time.
    pub now: DateTime<Utc>,
}

/// Stateful positioning pipeline owned by the scan worker.
#[derive(Debug, Clone)]
pub struct Positioner {
    config: PositioningConfig,
    window: SlidingWindow,
    last_accepted: Option<Location>,
    last_published: Option<Location>,
    last_outdoor_at: Option<DateTime<Utc>>,
    cycles_without_indoor: u32,
}

impl Positioner {
    /// Creates a pipeline with no history.
    #[must_use]
    pub fn new(config: PositioningConfig) -> Self {
        let window = SlidingWindow::new(config.sliding_window_size);
        Self {
            config,
            window,
            last_accepted: None,
            last_published: None,
            last_outdoor_at: None,
            cycles_without_indoor: 0,
        }
    }

    /// Last published location.
    #[must_use]
    pub const fn last_location(&self) -> Option<&Location> {
        self.last_published.as_ref()
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    /// Runs one cycle.
    pub fn process(&mut self, input: CycleInput<'_>) -> CycleOutcome {
        let Some(raw) = fuse(input.ranged, input.catalog) else {
            return self.without_indoor(&input);
        };
        self.cycles_without_indoor = 0;

        // the window only keeps fixes that end up published
        let mut window = self.window.clone();
        let candidate = if self.config.sliding_window_enabled {
            window.push(raw)
        } else {
            raw
        };
        let mut location = Location::indoor(
            candidate.position.latitude,
            candidate.position.longitude,
            candidate.position.floor,
        )
        .with_accuracy(candidate.accuracy)
        .with_timestamp(input.now);

        if self.config.limit_to_distance_filter_enabled {
            if let Some(last) = &self.last_accepted {
                if !DistanceFilter::new(self.config.maximum_meters_per_second).accepts(last, &location) {
                    debug!(
                        latitude = location.latitude,
                        longitude = location.longitude,
                        "Fix rejected by distance filter"
                    );
                    return CycleOutcome::RangedNoFix;
                }
            }
        }

        if self.config.motion_detector_enabled
            && self.last_published.is_some()
            && is_stationary(input.motion, self.config.motion_detector_threshold)
        {
            debug!(confidence = ?input.motion, "Device stationary, holding location");
            return CycleOutcome::RangedNoFix;
        }

        if self.config.path_snapping_enabled {
            if let Some(snapped) = snap_to_graph(candidate.position, input.catalog.graph()) {
                location.latitude = snapped.latitude;
                location.longitude = snapped.longitude;
            }
        }

        self.window = window;
        self.last_accepted = Some(location.clone());
        self.last_published = Some(location.clone());
        CycleOutcome::Published(location)
    }

    fn without_indoor(&mut self, input: &CycleInput<'_>) -> CycleOutcome {
        self.cycles_without_indoor = self.cycles_without_indoor.saturating_add(1);

        if self.config.outdoor_positioning_enabled
            && self.cycles_without_indoor >= self.config.outdoor_fallback_after_cycles
        {
            if let Some(fix) = input.outdoor {
                let fresh = self.last_outdoor_at.map_or(true, |at| fix.timestamp > at);
                if fresh && fix.coordinate().is_valid() {
                    let mut location = fix.clone();
                    location.floor = None;
                    self.last_outdoor_at = Some(fix.timestamp);
                    self.last_published = Some(location.clone());
                    return CycleOutcome::Published(location);
                }
            }
        }

        if input.ranged.is_empty() {
            CycleOutcome::Idle
        } else {
            CycleOutcome::RangedNoFix
        }
    }
}
