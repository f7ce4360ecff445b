//! Scan worker: one task per scanning session.
//!
//! Every period the worker pulls a batch from the scan source and runs a
//! [`ScanCycle`] over it. Proximity and positioning see the same aggregated
//! readings, in the same order, on the same task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, OwnedMutexGuard};
use tokio::time::MissedTickBehavior;
use tracing::{debug, debug_span, info, warn};

use crate::catalog::{CatalogSnapshot, CatalogStore};
use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventSink};
use crate::geo::Location;
use crate::positioning::{CycleInput, CycleOutcome, Positioner};
use crate::proximity::ProximityStateMachine;
use crate::ranging::{aggregate_cycle, ScanBatch};
use crate::sources::{MotionSource, OutdoorLocationSource, ScanError, ScanSource};

/// Per-session state advanced once per cycle.
#[derive(Debug)]
pub struct ScanCycle {
    config: EngineConfig,
    proximity: ProximityStateMachine,
    positioner: Positioner,
    bluetooth_available: bool,
    cycle: u64,
}

impl ScanCycle {
    /// Fresh state for a new session.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            proximity: ProximityStateMachine::new(config.proximity.clone()),
            positioner: Positioner::new(config.positioning.clone()),
            bluetooth_available: true,
            cycle: 0,
            config,
        }
    }

    /// Number of cycles run so far.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Runs one cycle and returns its events in delivery order.
    pub fn run(
        &mut self,
        batch: &ScanBatch,
        catalog: &CatalogSnapshot,
        motion: Option<f64>,
        outdoor: Option<&Location>,
        now: DateTime<Utc>,
    ) -> Vec<EngineEvent> {
        self.cycle += 1;
        let _span = debug_span!("scan_cycle", cycle = self.cycle).entered();
        let mut events = Vec::new();

        if batch.bluetooth_available != self.bluetooth_available {
            self.bluetooth_available = batch.bluetooth_available;
            info!(available = batch.bluetooth_available, "Bluetooth state changed");
            events.push(EngineEvent::BluetoothStateChanged {
                available: batch.bluetooth_available,
            });
        }

        let ranged = aggregate_cycle(
            batch,
            catalog,
            &self.config.ranging,
            &self.config.scan.proximity_uuids,
        );
        debug!(samples = batch.samples.len(), beacons = ranged.len(), "Batch aggregated");

        events.extend(self.proximity.update(&ranged, catalog, now));

        match self.positioner.process(CycleInput {
            ranged: &ranged,
            catalog,
            motion,
            outdoor,
            now,
        }) {
            CycleOutcome::Published(location) => events.push(EngineEvent::LocationUpdated { location }),
            CycleOutcome::RangedNoFix => events.push(EngineEvent::RangedNoFix {
                beacons: ranged.len(),
            }),
            CycleOutcome::Idle => {}
        }

        events
    }
}

/// Shared handles a worker needs.
pub(crate) struct WorkerContext {
    pub config: EngineConfig,
    pub source: OwnedMutexGuard<Box<dyn ScanSource>>,
    pub catalog: Arc<CatalogStore>,
    pub motion: Arc<dyn MotionSource>,
    pub outdoor: Arc<dyn OutdoorLocationSource>,
    pub sink: Arc<dyn EventSink>,
    pub last_location: Arc<ArcSwapOption<Location>>,
    pub scanning: Arc<AtomicBool>,
}

/// Runs cycles until `shutdown` flips or the source closes.
pub(crate) async fn run_scan_loop(mut ctx: WorkerContext, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs_f64(ctx.config.scan.period_secs);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; the first cycle covers one full period.
    ticker.tick().await;

    let mut cycle = ScanCycle::new(ctx.config.clone());
    info!(period_secs = ctx.config.scan.period_secs, "Scan worker started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let batch = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            batch = ctx.source.next_batch() => batch,
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(ScanError::Closed) => {
                warn!("Scan source closed, stopping worker");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Scan failed, treating cycle as radio unavailable");
                ScanBatch::unavailable()
            }
        };

        if *shutdown.borrow() {
            break;
        }
        let Some(catalog) = ctx.catalog.load() else {
            debug!("No catalog installed, skipping cycle");
            continue;
        };

        let outdoor = ctx.outdoor.latest_fix();
        let events = cycle.run(
            &batch,
            &catalog,
            ctx.motion.confidence(),
            outdoor.as_ref(),
            Utc::now(),
        );
        for event in events {
            if let EngineEvent::LocationUpdated { location } = &event {
                ctx.last_location.store(Some(Arc::new(location.clone())));
            }
            ctx.sink.emit(event);
        }
    }

    ctx.source.stop().await;
    ctx.scanning.store(false, Ordering::SeqCst);
    info!(cycles = cycle.cycles(), "Scan worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Beacon, BeaconId, DeviceAction, ProximityTrigger};
    use crate::navigation::WaypointGraph;
    use crate::ranging::BeaconSample;
    use uuid::Uuid;

    fn id() -> BeaconId {
        BeaconId::new(Uuid::nil(), 1, 1)
    }

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new(
            1,
            vec![Beacon::new(id()).positioned(0.0, 0.0, 0)],
            vec![DeviceAction {
                id: "hello".into(),
                name: "Hello".into(),
                description: String::new(),
                payload: serde_json::Value::Null,
                action_type: "notification".into(),
                activity: None,
                beacon: id(),
                trigger: ProximityTrigger::Near,
            }],
            WaypointGraph::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_cycle_emits_proximity_before_location() {
        let mut cycle = ScanCycle::new(EngineConfig::default());
        let batch = ScanBatch::new(vec![BeaconSample::with_distance(id(), 1.0)]);
        let events = cycle.run(&batch, &catalog(), None, None, Utc::now());

        assert!(matches!(events[0], EngineEvent::Entered { .. }));
        assert!(matches!(events[1], EngineEvent::ActionTriggered { .. }));
        assert!(matches!(events[2], EngineEvent::LocationUpdated { .. }));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_bluetooth_flip_is_reported_once() {
        let mut cycle = ScanCycle::new(EngineConfig::default());
        let catalog = catalog();

        let events = cycle.run(&ScanBatch::unavailable(), &catalog, None, None, Utc::now());
        assert_eq!(events, [EngineEvent::BluetoothStateChanged { available: false }]);
        assert!(cycle.run(&ScanBatch::unavailable(), &catalog, None, None, Utc::now()).is_empty());

        let events = cycle.run(&ScanBatch::new(Vec::new()), &catalog, None, None, Utc::now());
        assert_eq!(events, [EngineEvent::BluetoothStateChanged { available: true }]);
        assert_eq!(cycle.cycles(), 3);
    }

    #[test]
    fn test_unknown_beacons_only_yield_nothing() {
        let mut cycle = ScanCycle::new(EngineConfig::default());
        let stranger = BeaconId::new(Uuid::from_u128(5), 5, 5);
        let batch = ScanBatch::new(vec![BeaconSample::with_distance(stranger, 1.0)]);
        assert!(cycle.run(&batch, &catalog(), None, None, Utc::now()).is_empty());
    }
}
