//! Collaborators feeding the engine: scan batches, motion and outdoor fixes.
//!
//! The traits are what the engine consumes. The channel-backed types are the
//! adapters used when another process (or the HTTP host) pushes readings in.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::OutdoorAccuracy;
use crate::geo::Location;
use crate::ranging::{BeaconSample, ScanBatch};

/// Errors from a scan source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// No Bluetooth adapter is present.
    #[error("No Bluetooth adapter found")]
    AdapterNotFound,

    /// The adapter is present but powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// The source was closed and will not produce more batches.
    #[error("Scan source closed")]
    Closed,

    /// Samples were offered while no scanning session is running.
    #[error("No scanning session is running")]
    Inactive,

    /// The sample queue is at capacity.
    #[error("Sample queue is full")]
    QueueFull,

    /// Anything else reported by the platform stack.
    #[error("Scan failed: {0}")]
    Failed(String),
}

/// Source of one [`ScanBatch`] per cycle.
#[async_trait]
pub trait ScanSource: Send + 'static {
    /// Prepares the radio. Called once per scanning session.
    async fn start(&mut self) -> Result<(), ScanError> {
        Ok(())
    }

    /// Returns everything heard since the previous call.
    async fn next_batch(&mut self) -> Result<ScanBatch, ScanError>;

    /// Releases the radio. Called once when a session ends.
    async fn stop(&mut self) {}
}

/// Latest device-motion confidence, `0.0` (still) and up.
pub trait MotionSource: Send + Sync + 'static {
    /// Current confidence; `None` when no reading is available.
    fn confidence(&self) -> Option<f64>;
}

/// Platform outdoor positioning service.
pub trait OutdoorLocationSource: Send + Sync + 'static {
    /// Asks the service to start producing fixes at `accuracy`.
    fn start(&self, accuracy: OutdoorAccuracy);

    /// Asks the service to stop.
    fn stop(&self);

    /// Most recent fix, if any.
    fn latest_fix(&self) -> Option<Location>;
}

// =============================================================================
// CHANNEL-BACKED SCAN SOURCE
// =============================================================================

/// Samples a [`ChannelScanSource`] holds between two cycles.
pub const SAMPLE_QUEUE_CAPACITY: usize = 4096;

/// Producer side of a [`ChannelScanSource`].
#[derive(Debug, Clone)]
pub struct ScanFeed {
    samples: mpsc::Sender<BeaconSample>,
    available: watch::Sender<bool>,
    session: watch::Receiver<bool>,
}

impl ScanFeed {
    /// Queues one sample for the next cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Closed`] if the source was dropped,
    /// [`ScanError::Inactive`] outside a scanning session and
    /// [`ScanError::QueueFull`] when the queue is at capacity.
    pub fn push(&self, sample: BeaconSample) -> Result<(), ScanError> {
        if self.samples.is_closed() {
            return Err(ScanError::Closed);
        }
        if !self.is_active() {
            return Err(ScanError::Inactive);
        }
        self.samples.try_send(sample).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ScanError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ScanError::Closed,
        })
    }

    /// Queues several samples, stopping at the first rejected one.
    ///
    /// # Errors
    ///
    /// Same as [`ScanFeed::push`].
    pub fn push_all(&self, samples: impl IntoIterator<Item = BeaconSample>) -> Result<(), ScanError> {
        samples.into_iter().try_for_each(|s| self.push(s))
    }

    /// Reports whether the radio is usable.
    pub fn set_bluetooth_available(&self, available: bool) {
        self.available.send_replace(available);
    }

    /// Whether a scanning session is consuming samples.
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.session.borrow()
    }
}

/// Scan source that drains samples pushed through a [`ScanFeed`].
///
/// The feed only accepts samples between [`ScanSource::start`] and
/// [`ScanSource::stop`]. Anything still queued at either point is discarded.
#[derive(Debug)]
pub struct ChannelScanSource {
    samples: mpsc::Receiver<BeaconSample>,
    available: watch::Receiver<bool>,
    session: watch::Sender<bool>,
}

impl ChannelScanSource {
    /// Creates a connected feed/source pair. The radio starts as available.
    #[must_use]
    pub fn channel() -> (ScanFeed, Self) {
        Self::with_capacity(SAMPLE_QUEUE_CAPACITY)
    }

    /// Same as [`ChannelScanSource::channel`] with a custom queue size.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (ScanFeed, Self) {
        let (samples_tx, samples_rx) = mpsc::channel(capacity.max(1));
        let (available_tx, available_rx) = watch::channel(true);
        let (session_tx, session_rx) = watch::channel(false);
        (
            ScanFeed {
                samples: samples_tx,
                available: available_tx,
                session: session_rx,
            },
            Self {
                samples: samples_rx,
                available: available_rx,
                session: session_tx,
            },
        )
    }

    fn discard_queued(&mut self) -> usize {
        let mut discarded = 0;
        while self.samples.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

#[async_trait]
impl ScanSource for ChannelScanSource {
    async fn start(&mut self) -> Result<(), ScanError> {
        let discarded = self.discard_queued();
        if discarded > 0 {
            debug!(discarded, "Dropped samples queued before the session");
        }
        self.session.send_replace(true);
        Ok(())
    }

    async fn stop(&mut self) {
        self.session.send_replace(false);
        let discarded = self.discard_queued();
        if discarded > 0 {
            debug!(discarded, "Dropped samples queued at session end");
        }
    }

    async fn next_batch(&mut self) -> Result<ScanBatch, ScanError> {
        let mut samples = Vec::new();
        while let Ok(sample) = self.samples.try_recv() {
            samples.push(sample);
        }
        let mut batch = ScanBatch::new(samples);
        batch.bluetooth_available = *self.available.borrow();
        if !batch.bluetooth_available {
            batch.samples.clear();
        }
        Ok(batch)
    }
}

// =============================================================================
// WATCH-BACKED MOTION AND OUTDOOR SOURCES
// =============================================================================

/// Motion source reading the latest value of a watch channel.
#[derive(Debug, Clone)]
pub struct WatchMotionSource {
    rx: watch::Receiver<Option<f64>>,
}

impl WatchMotionSource {
    /// Creates a sender/source pair with no initial reading.
    #[must_use]
    pub fn channel() -> (watch::Sender<Option<f64>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }
}

impl MotionSource for WatchMotionSource {
    fn confidence(&self) -> Option<f64> {
        *self.rx.borrow()
    }
}

/// Producer side of a [`WatchOutdoorSource`].
#[derive(Debug, Clone)]
pub struct OutdoorFeed {
    fix: watch::Sender<Option<Location>>,
    requested: watch::Receiver<Option<OutdoorAccuracy>>,
}

impl OutdoorFeed {
    /// Publishes a new outdoor fix.
    pub fn publish(&self, location: Location) {
        self.fix.send_replace(Some(location));
    }

    /// Accuracy currently requested by the engine; `None` while stopped.
    #[must_use]
    pub fn requested_accuracy(&self) -> Option<OutdoorAccuracy> {
        *self.requested.borrow()
    }
}

/// Outdoor source backed by watch channels.
#[derive(Debug)]
pub struct WatchOutdoorSource {
    fix: watch::Receiver<Option<Location>>,
    requested: watch::Sender<Option<OutdoorAccuracy>>,
}

impl WatchOutdoorSource {
    /// Creates a feed/source pair.
    #[must_use]
    pub fn channel() -> (OutdoorFeed, Self) {
        let (fix_tx, fix_rx) = watch::channel(None);
        let (requested_tx, requested_rx) = watch::channel(None);
        (
            OutdoorFeed {
                fix: fix_tx,
                requested: requested_rx,
            },
            Self {
                fix: fix_rx,
                requested: requested_tx,
            },
        )
    }
}

impl OutdoorLocationSource for WatchOutdoorSource {
    fn start(&self, accuracy: OutdoorAccuracy) {
        self.requested.send_replace(Some(accuracy));
    }

    fn stop(&self) {
        self.requested.send_replace(None);
    }

    fn latest_fix(&self) -> Option<Location> {
        self.fix.borrow().clone()
    }
}

/// Motion source that never has a reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMotion;

impl MotionSource for NoMotion {
    fn confidence(&self) -> Option<f64> {
        None
    }
}

/// Outdoor source that never produces a fix.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutdoor;

impl OutdoorLocationSource for NoOutdoor {
    fn start(&self, _accuracy: OutdoorAccuracy) {}

    fn stop(&self) {}

    fn latest_fix(&self) -> Option<Location> {
        None
    }
}
