//! The caller-owned engine.
//!
//! An [`Engine`] holds the configuration, the installed catalog and the scan
//! worker. It replaces any process-wide controller: create one, share it
//! behind an `Arc`, and drop it when done.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::catalog::{CatalogDocument, CatalogError, CatalogSnapshot, CatalogStore};
use crate::config::{ConfigError, EngineConfig};
use crate::events::{EngineEvent, EventSink, NullSink};
use crate::geo::{Coordinate, IndoorPosition, Location};
use crate::navigation::{shortest_route, NavigationError, NavigationResult, NavigationRoute, RouteRequest};
use crate::sources::{MotionSource, NoMotion, NoOutdoor, OutdoorLocationSource, ScanError, ScanSource};
use crate::worker::{run_scan_loop, WorkerContext};

/// Library version reported by [`Engine::sdk_version`].
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Content availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No catalog has been installed.
    #[default]
    None,
    /// A catalog is installed but may be outdated.
    Offline,
    /// A fresh catalog is installed.
    Online,
}

impl EngineState {
    /// `true` once any catalog is available.
    #[must_use]
    pub const fn has_content(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The operation needs content that has not been installed.
    #[error("Operation not allowed in state {0:?}: install a catalog first")]
    InvalidState(EngineState),

    /// The catalog was rejected.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The scan source could not be started.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The scan worker panicked or was cancelled.
    #[error("Scan worker failed: {0}")]
    Worker(String),
}

/// Result alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A route together with the id used in its events.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ComputedRoute {
    /// Request id carried by the matching `RouteComputed` event.
    pub request_id: Uuid,
    /// The route.
    pub route: NavigationRoute,
}

struct ScanWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    scan_source: Box<dyn ScanSource>,
    motion: Arc<dyn MotionSource>,
    outdoor: Arc<dyn OutdoorLocationSource>,
    sink: Arc<dyn EventSink>,
}

impl EngineBuilder {
    /// Sets the motion source. Defaults to none (always moving).
    #[must_use]
    pub fn motion_source(mut self, motion: impl MotionSource) -> Self {
        self.motion = Arc::new(motion);
        self
    }

    /// Sets the outdoor positioning source. Defaults to none.
    #[must_use]
    pub fn outdoor_source(mut self, outdoor: impl OutdoorLocationSource) -> Self {
        self.outdoor = Arc::new(outdoor);
        self
    }

    /// Sets the event sink. Defaults to discarding events.
    #[must_use]
    pub fn event_sink(mut self, sink: impl EventSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the configuration is invalid.
    pub fn build(self) -> EngineResult<Engine> {
        self.config.validate()?;
        let (state, _) = watch::channel(EngineState::None);
        Ok(Engine {
            config: ArcSwap::from_pointee(self.config.normalized()),
            catalog: Arc::new(CatalogStore::new()),
            state,
            scan_source: Arc::new(Mutex::new(self.scan_source)),
            motion: self.motion,
            outdoor: self.outdoor,
            sink: self.sink,
            worker: Mutex::new(None),
            scanning: Arc::new(AtomicBool::new(false)),
            last_location: Arc::new(ArcSwapOption::empty()),
        })
    }
}

/// Proximity tracking, positioning and routing over one catalog.
pub struct Engine {
    config: ArcSwap<EngineConfig>,
    catalog: Arc<CatalogStore>,
    state: watch::Sender<EngineState>,
    scan_source: Arc<Mutex<Box<dyn ScanSource>>>,
    motion: Arc<dyn MotionSource>,
    outdoor: Arc<dyn OutdoorLocationSource>,
    sink: Arc<dyn EventSink>,
    worker: Mutex<Option<ScanWorker>>,
    scanning: Arc<AtomicBool>,
    last_location: Arc<ArcSwapOption<Location>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("scanning", &self.is_scanning())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Starts building an engine around a scan source.
    #[must_use]
    pub fn builder(config: EngineConfig, scan_source: impl ScanSource) -> EngineBuilder {
        EngineBuilder {
            config,
            scan_source: Box::new(scan_source),
            motion: Arc::new(NoMotion),
            outdoor: Arc::new(NoOutdoor),
            sink: Arc::new(NullSink),
        }
    }

    /// Library version.
    #[must_use]
    pub const fn sdk_version() -> &'static str {
        SDK_VERSION
    }

    // =========================================================================
    // CONTENT
    // =========================================================================

    /// Current content state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Installs a catalog snapshot atomically and marks content fresh.
    pub fn install_catalog(&self, snapshot: CatalogSnapshot) -> Arc<CatalogSnapshot> {
        let installed = self.catalog.install(snapshot);
        self.state.send_replace(EngineState::Online);
        info!(
            version = installed.version(),
            beacons = installed.beacons().len(),
            actions = installed.actions().len(),
            waypoints = installed.graph().node_count(),
            "Catalog installed"
        );
        self.sink.emit(EngineEvent::ContentUpdated {
            version: installed.version(),
        });
        installed
    }

    /// Validates and installs a catalog document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Catalog`] if the document is invalid; the
    /// current catalog stays installed.
    pub fn install_document(&self, document: CatalogDocument) -> EngineResult<Arc<CatalogSnapshot>> {
        let snapshot = CatalogSnapshot::from_document(document)?;
        Ok(self.install_catalog(snapshot))
    }

    /// Marks installed content as possibly outdated.
    pub fn mark_content_stale(&self) {
        self.state.send_if_modified(|state| {
            if *state == EngineState::Online {
                *state = EngineState::Offline;
                true
            } else {
                false
            }
        });
    }

    /// The installed catalog.
    #[must_use]
    pub fn catalog(&self) -> Option<Arc<CatalogSnapshot>> {
        self.catalog.load()
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.load_full()
    }

    /// Replaces the configuration. Takes effect on the next [`Engine::start_scan`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if the configuration is invalid.
    pub fn set_config(&self, config: EngineConfig) -> EngineResult<()> {
        config.validate()?;
        self.config.store(Arc::new(config.normalized()));
        Ok(())
    }

    // =========================================================================
    // SCANNING
    // =========================================================================

    /// Whether a scan worker is running.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Last published location.
    #[must_use]
    pub fn last_location(&self) -> Option<Location> {
        self.last_location.load_full().map(|l| (*l).clone())
    }

    /// Starts the scan worker. Does nothing if already scanning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] before any catalog is installed,
    /// or [`EngineError::Scan`] if the scan source fails to start.
    pub async fn start_scan(&self) -> EngineResult<()> {
        let state = self.state();
        if !state.has_content() {
            return Err(EngineError::InvalidState(state));
        }

        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            debug!("Scan already running");
            return Ok(());
        }

        let config = (*self.config.load_full()).clone();
        let mut source = Arc::clone(&self.scan_source).lock_owned().await;
        source.start().await?;

        if config.positioning.outdoor_positioning_enabled {
            self.outdoor.start(config.positioning.outdoor_positioning_accuracy);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        self.scanning.store(true, Ordering::SeqCst);
        let ctx = WorkerContext {
            config,
            source,
            catalog: Arc::clone(&self.catalog),
            motion: Arc::clone(&self.motion),
            outdoor: Arc::clone(&self.outdoor),
            sink: Arc::clone(&self.sink),
            last_location: Arc::clone(&self.last_location),
            scanning: Arc::clone(&self.scanning),
        };
        let handle = tokio::spawn(run_scan_loop(ctx, shutdown_rx).instrument(info_span!("scan_worker")));
        *worker = Some(ScanWorker { shutdown, handle });
        info!("Scanning started");
        Ok(())
    }

    /// Stops the scan worker and waits for it to finish.
    ///
    /// No event from the stopped session is emitted after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Worker`] if the worker panicked.
    pub async fn stop_scan(&self) -> EngineResult<()> {
        let Some(worker) = self.worker.lock().await.take() else {
            return Ok(());
        };
        worker.shutdown.send_replace(true);
        let joined = worker.handle.await;
        self.scanning.store(false, Ordering::SeqCst);
        self.outdoor.stop();
        info!("Scanning stopped");
        joined.map_err(|e| EngineError::Worker(e.to_string()))
    }

    // =========================================================================
    // NAVIGATION
    // =========================================================================

    /// Computes the shortest route for `request`.
    ///
    /// Runs on the blocking pool against the catalog snapshot current at call
    /// time. Emits `RouteComputed` or `RouteFailed` with the request id.
    ///
    /// # Errors
    ///
    /// Returns a [`NavigationError`]; `InvalidState` before any catalog is
    /// installed.
    pub async fn navigation_route(&self, request: RouteRequest) -> NavigationResult<ComputedRoute> {
        let request_id = Uuid::new_v4();
        let result = self
            .compute_route(request)
            .instrument(info_span!("navigation_route", %request_id))
            .await;

        match result {
            Ok(route) => {
                self.sink.emit(EngineEvent::RouteComputed {
                    request_id,
                    route: route.clone(),
                });
                Ok(ComputedRoute { request_id, route })
            }
            Err(error) => {
                warn!(%request_id, %error, "Route request failed");
                self.sink.emit(EngineEvent::RouteFailed {
                    request_id,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Computes a route between two coordinates on the given floors.
    ///
    /// # Errors
    ///
    /// See [`Engine::navigation_route`].
    pub async fn navigation_route_between(
        &self,
        start: Coordinate,
        start_floor: i32,
        destination: Coordinate,
        destination_floor: i32,
    ) -> NavigationResult<ComputedRoute> {
        self.navigation_route(RouteRequest {
            start: IndoorPosition::new(start.latitude, start.longitude, start_floor),
            destination: IndoorPosition::new(destination.latitude, destination.longitude, destination_floor),
        })
        .await
    }

    async fn compute_route(&self, request: RouteRequest) -> NavigationResult<NavigationRoute> {
        let state = self.state();
        let snapshot = self
            .catalog
            .load()
            .filter(|_| state.has_content())
            .ok_or_else(|| NavigationError::InvalidState(format!("{state:?}")))?;

        tokio::task::spawn_blocking(move || {
            shortest_route(snapshot.graph(), request.start, request.destination)
        })
        .await
        .map_err(|e| NavigationError::Other(e.to_string()))?
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Stops scanning and forgets all content and location history.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Worker`] if the worker panicked; the content is
    /// cleared regardless.
    pub async fn clear_cached_data(&self) -> EngineResult<()> {
        let stopped = self.stop_scan().await;
        self.catalog.clear();
        self.last_location.store(None);
        self.state.send_replace(EngineState::None);
        info!("Cached data cleared");
        stopped
    }

    /// Stops scanning and restores the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Worker`] if the worker panicked; the defaults
    /// are restored regardless.
    pub async fn reset_to_default_values(&self) -> EngineResult<()> {
        let stopped = self.stop_scan().await;
        self.config.store(Arc::new(EngineConfig::default()));
        info!("Configuration reset to defaults");
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Beacon, BeaconId, DeviceAction, ProximityTrigger};
    use crate::navigation::{Connection, WaypointGraph, WaypointRecord};
    use crate::ranging::{BeaconSample, ScanBatch};
    use crate::sources::{ChannelScanSource, ScanFeed};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn id() -> BeaconId {
        BeaconId::new(Uuid::nil(), 3, 1)
    }

    fn snapshot() -> CatalogSnapshot {
        let wp = |id: &str, lng: f64, floor: i32, to: &[(&str, f64)]| WaypointRecord {
            id: id.into(),
            latitude: 0.0,
            longitude: lng,
            floor,
            name: None,
            connections: to
                .iter()
                .map(|(t, d)| Connection {
                    to: (*t).into(),
                    distance: Some(*d),
                })
                .collect(),
        };
        let graph = WaypointGraph::from_records(&[
            wp("a", 0.0, 0, &[("b", 5.0)]),
            wp("b", 0.0001, 0, &[]),
            wp("attic", 0.0, 9, &[]),
        ])
        .unwrap();
        CatalogSnapshot::new(
            4,
            vec![Beacon::new(id()).positioned(0.0, 0.0, 0)],
            vec![DeviceAction {
                id: "greet".into(),
                name: "Greet".into(),
                description: String::new(),
                payload: serde_json::json!({"text": "hi"}),
                action_type: "notification".into(),
                activity: None,
                beacon: id(),
                trigger: ProximityTrigger::Far,
            }],
            graph,
        )
        .unwrap()
    }

    fn engine() -> (Engine, ScanFeed, mpsc::UnboundedReceiver<EngineEvent>) {
        let (feed, source) = ChannelScanSource::channel();
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::builder(EngineConfig::default(), source)
            .event_sink(tx)
            .build()
            .unwrap();
        (engine, feed, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_scanning_requires_content() {
        let (engine, _feed, _rx) = engine();
        assert_eq!(engine.state(), EngineState::None);
        let err = assert_err!(engine.start_scan().await);
        assert!(matches!(err, EngineError::InvalidState(EngineState::None)));
        assert!(!engine.is_scanning());
    }

    #[tokio::test]
    async fn test_content_state_transitions() {
        let (engine, _feed, mut rx) = engine();
        engine.install_catalog(snapshot());
        assert_eq!(engine.state(), EngineState::Online);
        assert_eq!(drain(&mut rx), [EngineEvent::ContentUpdated { version: 4 }]);

        engine.mark_content_stale();
        assert_eq!(engine.state(), EngineState::Offline);

        assert_ok!(engine.clear_cached_data().await);
        assert_eq!(engine.state(), EngineState::None);
        assert!(engine.catalog().is_none());
        engine.mark_content_stale();
        assert_eq!(engine.state(), EngineState::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_cycle_delivers_events() {
        let (engine, feed, mut rx) = engine();
        engine.install_catalog(snapshot());
        drain(&mut rx);

        assert_ok!(engine.start_scan().await);
        assert!(engine.is_scanning());
        assert_ok!(feed.push(BeaconSample::with_distance(id(), 2.0)));

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        let events = drain(&mut rx);
        assert!(matches!(events[0], EngineEvent::Entered { .. }));
        assert!(matches!(&events[1], EngineEvent::ActionTriggered { action, .. } if action.id == "greet"));
        assert!(matches!(events[2], EngineEvent::LocationUpdated { .. }));
        assert_eq!(engine.last_location().unwrap().floor, Some(0));

        assert_ok!(engine.stop_scan().await);
        assert!(!engine.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_is_published_after_stop() {
        let (engine, feed, mut rx) = engine();
        engine.install_catalog(snapshot());
        assert_ok!(engine.start_scan().await);
        assert_ok!(engine.stop_scan().await);
        drain(&mut rx);

        let err = assert_err!(feed.push(BeaconSample::with_distance(id(), 2.0)));
        assert_eq!(err, ScanError::Inactive);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(engine.last_location().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_period_discards_queued_samples() {
        let (engine, feed, mut rx) = engine();
        engine.install_catalog(snapshot());
        drain(&mut rx);

        assert_ok!(engine.start_scan().await);
        assert_ok!(feed.push(BeaconSample::with_distance(id(), 2.0)));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_ok!(engine.stop_scan().await);

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert!(drain(&mut rx).is_empty());

        // a new session does not see the previous session's samples
        assert_ok!(engine.start_scan().await);
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(engine.last_location().is_none());
        assert_ok!(engine.stop_scan().await);
    }

    /// Delivers one sighting of the catalog beacon, ten seconds after it is asked.
    struct SlowSource;

    #[async_trait::async_trait]
    impl ScanSource for SlowSource {
        async fn next_batch(&mut self) -> Result<ScanBatch, ScanError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ScanBatch::new(vec![BeaconSample::with_distance(id(), 2.0)]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_pending_batch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = Engine::builder(EngineConfig::default(), SlowSource)
            .event_sink(tx)
            .build()
            .unwrap();
        engine.install_catalog(snapshot());
        drain(&mut rx);

        assert_ok!(engine.start_scan().await);
        // the first tick fired at 5 s; the batch is still pending
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_ok!(engine.stop_scan().await);
        assert!(!engine.is_scanning());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(engine.last_location().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_can_restart_after_stop() {
        let (engine, feed, mut rx) = engine();
        engine.install_catalog(snapshot());
        assert_ok!(engine.start_scan().await);
        assert_ok!(engine.start_scan().await);
        assert_ok!(engine.stop_scan().await);
        assert_ok!(engine.start_scan().await);
        drain(&mut rx);

        feed.set_bluetooth_available(false);
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(
            drain(&mut rx),
            [EngineEvent::BluetoothStateChanged { available: false }]
        );
        assert_ok!(engine.stop_scan().await);
    }

    #[tokio::test]
    async fn test_navigation_route_emits_events() {
        let (engine, _feed, mut rx) = engine();
        let request = RouteRequest {
            start: IndoorPosition::new(0.0, 0.0, 0),
            destination: IndoorPosition::new(0.0, 0.0001, 0),
        };

        let err = assert_err!(engine.navigation_route(request).await);
        assert!(matches!(err, NavigationError::InvalidState(_)));
        assert!(matches!(drain(&mut rx)[..], [EngineEvent::RouteFailed { .. }]));

        engine.install_catalog(snapshot());
        drain(&mut rx);

        let computed = engine.navigation_route(request).await.unwrap();
        assert!((computed.route.total_distance - 5.0).abs() < 1e-9);
        match &drain(&mut rx)[..] {
            [EngineEvent::RouteComputed { request_id, .. }] => assert_eq!(*request_id, computed.request_id),
            other => panic!("unexpected events: {other:?}"),
        }

        let err = assert_err!(
            engine
                .navigation_route_between(Coordinate::new(0.0, 0.0), 0, Coordinate::new(0.0, 0.0), 9)
                .await
        );
        assert_eq!(
            err,
            NavigationError::NoPath {
                from_floor: 0,
                to_floor: 9
            }
        );
    }

    #[tokio::test]
    async fn test_config_updates_and_reset() {
        let (engine, _feed, _rx) = engine();
        let mut config = EngineConfig::default();
        config.scan.period_secs = 1.0;
        config.positioning.path_snapping_enabled = true;
        assert_ok!(engine.set_config(config));
        assert_eq!(engine.config().scan.period_secs, 2.0);
        assert!(engine.config().positioning.path_snapping_enabled);

        let mut invalid = EngineConfig::default();
        invalid.proximity.exit_after_missed_cycles = 0;
        assert!(matches!(engine.set_config(invalid), Err(EngineError::Config(_))));

        assert_ok!(engine.reset_to_default_values().await);
        assert_eq!(*engine.config(), EngineConfig::default());
    }

    #[test]
    fn test_sdk_version() {
        assert_eq!(Engine::sdk_version(), env!("CARGO_PKG_VERSION"));
    }
}
