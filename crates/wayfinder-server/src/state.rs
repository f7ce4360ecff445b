//! Application state shared across handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use wayfinder_core::{
    ChannelScanSource, Engine, EngineConfig, EngineResult, OutdoorFeed, ScanFeed, ScanSource,
    WatchMotionSource, WatchOutdoorSource,
};

use crate::event_log::EventLog;

/// State handle passed to every handler.
pub type SharedState = AppState;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: Engine,
    config_path: Option<PathBuf>,
    scan_feed: Option<ScanFeed>,
    motion: watch::Sender<Option<f64>>,
    outdoor: OutdoorFeed,
    events: EventLog,
    started_at: Instant,
}

impl AppState {
    /// State whose scan samples arrive through `POST /api/scan/samples`.
    ///
    /// Configuration changes are written back to `config_path` when set.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: EngineConfig, config_path: Option<PathBuf>) -> EngineResult<Self> {
        let (feed, source) = ChannelScanSource::channel();
        Self::build(config, config_path, source, Some(feed))
    }

    /// State scanning with the local BlueZ adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    #[cfg(feature = "bluetooth")]
    pub fn with_bluez(config: EngineConfig, config_path: Option<PathBuf>) -> EngineResult<Self> {
        let scanner = wayfinder_core::BlueZScanner::new(&config.ranging);
        Self::build(config, config_path, scanner, None)
    }

    fn build(
        config: EngineConfig,
        config_path: Option<PathBuf>,
        source: impl ScanSource,
        scan_feed: Option<ScanFeed>,
    ) -> EngineResult<Self> {
        let (motion, motion_source) = WatchMotionSource::channel();
        let (outdoor, outdoor_source) = WatchOutdoorSource::channel();
        let events = EventLog::default();

        let engine = Engine::builder(config, source)
            .motion_source(motion_source)
            .outdoor_source(outdoor_source)
            .event_sink(events.clone())
            .build()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                engine,
                config_path,
                scan_feed,
                motion,
                outdoor,
                events,
                started_at: Instant::now(),
            }),
        })
    }

    /// The engine.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Where configuration changes are persisted, if anywhere.
    #[must_use]
    pub fn config_path(&self) -> Option<&PathBuf> {
        self.inner.config_path.as_ref()
    }

    /// Feed for externally supplied scan samples. `None` when scanning a
    /// local adapter.
    #[must_use]
    pub fn scan_feed(&self) -> Option<&ScanFeed> {
        self.inner.scan_feed.as_ref()
    }

    /// Publishes a motion confidence reading.
    pub fn set_motion(&self, confidence: Option<f64>) {
        self.inner.motion.send_replace(confidence);
    }

    /// Outdoor location feed.
    #[must_use]
    pub fn outdoor(&self) -> &OutdoorFeed {
        &self.inner.outdoor
    }

    /// Recorded engine events.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.inner.events
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
