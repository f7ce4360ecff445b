//! iBeacon ranging over BlueZ.
//!
//! Available with the `bluetooth` feature on Linux. Discovery runs in a
//! background task for the whole session; each [`ScanSource::next_batch`] call
//! drains whatever was heard since the previous one.

use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{pin_mut, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::RangingConfig;
use crate::ranging::{parse_ibeacon, rssi_to_distance, BeaconSample, ScanBatch, APPLE_COMPANY_ID};
use crate::sources::{ScanError, ScanSource};

/// Scan source backed by a BlueZ adapter.
pub struct BlueZScanner {
    adapter_name: Option<String>,
    path_loss_exponent: f64,
    session: Option<ScanSession>,
}

struct ScanSession {
    _session: Session,
    adapter: Adapter,
    samples: mpsc::UnboundedReceiver<BeaconSample>,
    task: JoinHandle<()>,
}

impl BlueZScanner {
    /// Scanner on the default adapter.
    #[must_use]
    pub fn new(ranging: &RangingConfig) -> Self {
        Self {
            adapter_name: None,
            path_loss_exponent: ranging.path_loss_exponent,
            session: None,
        }
    }

    /// Scanner on a named adapter such as `hci1`.
    #[must_use]
    pub fn with_adapter(ranging: &RangingConfig, name: impl Into<String>) -> Self {
        Self {
            adapter_name: Some(name.into()),
            ..Self::new(ranging)
        }
    }
}

fn scan_error(e: bluer::Error) -> ScanError {
    ScanError::Failed(e.to_string())
}

#[async_trait]
impl ScanSource for BlueZScanner {
    async fn start(&mut self) -> Result<(), ScanError> {
        let session = Session::new().await.map_err(scan_error)?;
        let adapter = match &self.adapter_name {
            Some(name) => session.adapter(name).map_err(|_| ScanError::AdapterNotFound)?,
            None => session
                .default_adapter()
                .await
                .map_err(|_| ScanError::AdapterNotFound)?,
        };
        if !adapter.is_powered().await.map_err(scan_error)? {
            return Err(ScanError::AdapterPoweredOff);
        }
        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: true,
                ..DiscoveryFilter::default()
            })
            .await
            .map_err(scan_error)?;

        let (tx, samples) = mpsc::unbounded_channel();
        let task = tokio::spawn(discover(adapter.clone(), tx, self.path_loss_exponent));
        info!(adapter = adapter.name(), "BlueZ discovery started");

        self.session = Some(ScanSession {
            _session: session,
            adapter,
            samples,
            task,
        });
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<ScanBatch, ScanError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ScanError::Failed("scanner not started".to_string()))?;

        if session.task.is_finished() {
            return Err(ScanError::Closed);
        }
        let available = session.adapter.is_powered().await.unwrap_or(false);

        let mut samples = Vec::new();
        while let Ok(sample) = session.samples.try_recv() {
            samples.push(sample);
        }
        let mut batch = ScanBatch::new(samples);
        batch.bluetooth_available = available;
        Ok(batch)
    }

    async fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
            debug!("BlueZ discovery stopped");
        }
    }
}

async fn discover(adapter: Adapter, tx: mpsc::UnboundedSender<BeaconSample>, path_loss_exponent: f64) {
    let events = match adapter.discover_devices_with_changes().await {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "Failed to start discovery");
            return;
        }
    };
    pin_mut!(events);

    // Property changes are reported as DeviceAdded again.
    while let Some(event) = events.next().await {
        let AdapterEvent::DeviceAdded(address) = event else {
            continue;
        };
        match read_sample(&adapter, address, path_loss_exponent).await {
            Ok(Some(sample)) => {
                if tx.send(sample).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => trace!(%address, error = %e, "Skipping device"),
        }
    }
}

async fn read_sample(
    adapter: &Adapter,
    address: Address,
    path_loss_exponent: f64,
) -> bluer::Result<Option<BeaconSample>> {
    let device = adapter.device(address)?;
    let Some(data) = device.manufacturer_data().await? else {
        return Ok(None);
    };
    let Some(advertisement) = data.get(&APPLE_COMPANY_ID).and_then(|d| parse_ibeacon(d)) else {
        return Ok(None);
    };
    let Some(rssi) = device.rssi().await? else {
        return Ok(None);
    };

    let mut sample = BeaconSample::with_rssi(advertisement.id, rssi);
    sample.distance = rssi_to_distance(rssi, advertisement.measured_power, path_loss_exponent);
    Ok(Some(sample))
}
