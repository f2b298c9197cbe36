//! Gateway aggregate: poll loop, dispatch supervision and shutdown.
//!
//! ```text
//! radio.poll() ──► poll loop ──► work queue ──► supervisor ──► dispatch task (one per packet)
//!                                                                  │
//!                                              join handler ◄──────┴──────► decoder ► readings
//!                                                   │
//!                                              transmitter ──► radio.transmit()
//! ```
//!
//! The poll loop never waits on dispatch. Dispatch tasks are tracked so
//! shutdown can give them a bounded grace period before the radio is stopped.

use log::{error, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ConfigError;
use crate::decoder::PayloadDecoder;
use crate::device::{DeviceRegistry, RegistryError};
use crate::dispatch::Dispatcher;
use crate::gpio::GpioError;
use crate::join::{JoinHandler, RX2_DELAY};
use crate::radio::{lock_radio, DownlinkProfile, RadioError, SharedRadio, Transmitter};
use crate::random::RandomSource;
use crate::readings::{Readings, ReadingsStore};
use crate::stats::GatewayStats;

/// Wait between polls when the radio has nothing.
pub const POLL_BACKOFF: Duration = Duration::from_millis(10);

/// Wait after a radio error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Default time dispatch tasks get to finish at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Errors that stop the gateway from starting.
#[derive(Debug)]
pub enum GatewayError {
    /// The concentrator could not be started.
    HardwareInitFailed(RadioError),
    /// The GPIO reset sequence failed.
    GpioResetFailed(GpioError),
    /// Invalid configuration.
    Config(ConfigError),
    /// Invalid device set.
    Registry(RegistryError),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::HardwareInitFailed(e) => write!(f, "hardware init failed: {}", e),
            GatewayError::GpioResetFailed(e) => write!(f, "concentrator reset failed: {}", e),
            GatewayError::Config(e) => write!(f, "configuration error: {}", e),
            GatewayError::Registry(e) => write!(f, "device registry error: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::HardwareInitFailed(e) => Some(e),
            GatewayError::GpioResetFailed(e) => Some(e),
            GatewayError::Config(e) => Some(e),
            GatewayError::Registry(e) => Some(e),
        }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(e: ConfigError) -> Self {
        GatewayError::Config(e)
    }
}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        GatewayError::Registry(e)
    }
}

impl From<GpioError> for GatewayError {
    fn from(e: GpioError) -> Self {
        GatewayError::GpioResetFailed(e)
    }
}

/// Runtime settings for a gateway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatewaySettings {
    /// SPI device index passed to the HAL.
    pub device_index: u8,
    /// Join-request to join-accept delay.
    pub rx2_delay: Duration,
    /// Radio parameters for join accepts.
    pub downlink: DownlinkProfile,
    /// How long shutdown waits for in-flight dispatch tasks.
    pub shutdown_grace: Duration,
    /// Idle wait between empty polls.
    pub poll_backoff: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            rx2_delay: RX2_DELAY,
            downlink: DownlinkProfile::RX2,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            poll_backoff: POLL_BACKOFF,
        }
    }
}

/// A frame copied out of the radio, waiting for dispatch.
struct ReceivedFrame {
    payload: Vec<u8>,
    received_at: Instant,
}

/// A running gateway.
///
/// Dropping it cancels the poll loop; call [`Gateway::shutdown`] to also
/// drain dispatch tasks and stop the radio.
pub struct Gateway {
    /// Configured devices and their sessions.
    registry: Arc<DeviceRegistry>,
    /// Latest readings per device.
    readings: Arc<ReadingsStore>,
    /// Counters.
    stats: Arc<GatewayStats>,
    /// The concentrator.
    radio: SharedRadio,
    /// Shutdown signal for the poll loop, supervisor and dispatch tasks.
    cancel: CancellationToken,
    /// Outstanding dispatch tasks.
    tracker: TaskTracker,
    poller: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
    shutdown_grace: Duration,
}

impl Gateway {
    /// Initialize the radio and start polling.
    ///
    /// The concentrator must already have been reset (see
    /// [`crate::gpio::reset_concentrator`]).
    pub async fn start(
        radio: SharedRadio,
        registry: DeviceRegistry,
        decoder: Arc<dyn PayloadDecoder>,
        random: Arc<dyn RandomSource>,
        settings: GatewaySettings,
    ) -> Result<Self, GatewayError> {
        let init = Arc::clone(&radio);
        let index = settings.device_index;
        tokio::task::spawn_blocking(move || lock_radio(&init).initialize(index))
            .await
            .map_err(|e| GatewayError::HardwareInitFailed(RadioError::Task(e.to_string())))?
            .map_err(GatewayError::HardwareInitFailed)?;

        let registry = Arc::new(registry);
        let readings = Arc::new(ReadingsStore::new());
        let stats = Arc::new(GatewayStats::new());

        let joins = JoinHandler::new(
            Arc::clone(&registry),
            Transmitter::new(Arc::clone(&radio)),
            random,
        )
        .with_rx2_delay(settings.rx2_delay)
        .with_downlink(settings.downlink);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&readings),
            joins,
            decoder,
            Arc::clone(&stats),
        ));

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let poller = tokio::spawn(poll_loop(
            Arc::clone(&radio),
            queue_tx,
            Arc::clone(&stats),
            cancel.clone(),
            settings.poll_backoff,
        ));
        let supervisor = tokio::spawn(supervise(
            queue_rx,
            dispatcher,
            tracker.clone(),
            cancel.clone(),
        ));

        info!("Gateway started with {} devices", registry.len());

        Ok(Self {
            registry,
            readings,
            stats,
            radio,
            cancel,
            tracker,
            poller: Some(poller),
            supervisor: Some(supervisor),
            shutdown_grace: settings.shutdown_grace,
        })
    }

    /// Point-in-time copy of all readings.
    pub fn get_readings(&self) -> BTreeMap<String, Readings> {
        self.readings.snapshot()
    }

    pub fn readings(&self) -> Arc<ReadingsStore> {
        Arc::clone(&self.readings)
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn stats(&self) -> Arc<GatewayStats> {
        Arc::clone(&self.stats)
    }

    /// Stop polling, wait up to the grace period for dispatch tasks, then stop the radio.
    pub async fn shutdown(mut self) -> Result<(), RadioError> {
        info!("Gateway shutting down");
        self.cancel.cancel();

        if let Some(poller) = self.poller.take() {
            if let Err(e) = poller.await {
                error!("Poll loop task failed: {}", e);
            }
        }
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(e) = supervisor.await {
                error!("Supervisor task failed: {}", e);
            }
        }

        self.tracker.close();
        if tokio::time::timeout(self.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "Abandoning {} dispatch tasks after {:?}",
                self.tracker.len(),
                self.shutdown_grace
            );
        }

        // Waits for any transmission still holding the radio.
        let radio = Arc::clone(&self.radio);
        tokio::task::spawn_blocking(move || lock_radio(&radio).shutdown())
            .await
            .map_err(|e| RadioError::Task(e.to_string()))??;

        info!("Gateway stopped");
        Ok(())
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Pull packets from the radio and queue them for dispatch.
async fn poll_loop(
    radio: SharedRadio,
    queue: mpsc::UnboundedSender<ReceivedFrame>,
    stats: Arc<GatewayStats>,
    cancel: CancellationToken,
    backoff: Duration,
) {
    info!("Poll loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let poll = Arc::clone(&radio);
        let result = tokio::task::spawn_blocking(move || lock_radio(&poll).poll()).await;

        let wait = match result {
            Ok(Ok(Some(packet))) => {
                GatewayStats::incr(&stats.packets_received);
                let frame = ReceivedFrame {
                    payload: packet.payload,
                    received_at: Instant::now(),
                };
                if queue.send(frame).is_err() {
                    // Supervisor gone, nothing left to dispatch to.
                    break;
                }
                continue;
            }
            Ok(Ok(None)) => backoff,
            Ok(Err(e)) => {
                error!("Error receiving LoRa packet: {}", e);
                GatewayStats::incr(&stats.radio_errors);
                ERROR_BACKOFF
            }
            Err(e) => {
                error!("Radio poll task panicked: {}", e);
                GatewayStats::incr(&stats.radio_errors);
                ERROR_BACKOFF
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!("Poll loop stopped");
}

/// Spawn one tracked dispatch task per queued frame until cancelled.
async fn supervise(
    mut queue: mpsc::UnboundedReceiver<ReceivedFrame>,
    dispatcher: Arc<Dispatcher>,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = queue.recv() => {
                let Some(frame) = next else { break };
                let dispatcher = Arc::clone(&dispatcher);
                let cancel = cancel.clone();
                tracker.spawn(async move {
                    dispatcher
                        .dispatch(&frame.payload, frame.received_at, &cancel)
                        .await;
                });
            }
        }
    }

    let dropped = queue.len();
    if dropped > 0 {
        warn!("Dropping {} undispatched frames at shutdown", dropped);
    }
    tracker.close();
}
