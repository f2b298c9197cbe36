//! Radio port: the boundary to the concentrator HAL.
//!
//! The HAL is blocking and not thread-safe, so the gateway keeps it behind a
//! `std::sync::Mutex` and calls it from `spawn_blocking`. All transmissions go
//! through a [`Transmitter`], which serialises them gateway-wide.

#[cfg(feature = "sx1302")]
pub mod sx1302;

use log::{debug, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Largest payload the concentrator accepts.
pub const MAX_PAYLOAD: usize = 255;

/// Radio port errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// Operation attempted before `initialize` or after `shutdown`.
    NotStarted,
    /// The HAL returned an error code.
    Hal { op: &'static str, code: i32 },
    /// Payload exceeds [`MAX_PAYLOAD`].
    PayloadTooLarge(usize),
    /// The blocking task running the HAL call panicked or was cancelled.
    Task(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::NotStarted => write!(f, "radio not started"),
            RadioError::Hal { op, code } => write!(f, "{} failed with HAL code {}", op, code),
            RadioError::PayloadTooLarge(len) => {
                write!(f, "payload of {} bytes exceeds {} byte limit", len, MAX_PAYLOAD)
            }
            RadioError::Task(e) => write!(f, "radio task failed: {}", e),
        }
    }
}

impl std::error::Error for RadioError {}

/// Packet handed up by the concentrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPacket {
    pub payload: Vec<u8>,
    pub freq_hz: u32,
    pub rssi: f32,
    pub snr: f32,
}

impl RawPacket {
    /// Packet with only a payload, as used by mocks and replay.
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            freq_hz: 0,
            rssi: 0.0,
            snr: 0.0,
        }
    }

    pub fn size(&self) -> u16 {
        self.payload.len() as u16
    }
}

/// When the concentrator sends a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxMode {
    Immediate = 0,
    Timestamped = 1,
    OnGps = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Modulation {
    Lora = 0x10,
    Fsk = 0x20,
}

/// LoRa bandwidth, encoded as the HAL expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bandwidth {
    Khz125 = 0x04,
    Khz250 = 0x05,
    Khz500 = 0x06,
}

impl Bandwidth {
    pub fn from_khz(khz: u32) -> Option<Self> {
        match khz {
            125 => Some(Self::Khz125),
            250 => Some(Self::Khz250),
            500 => Some(Self::Khz500),
            _ => None,
        }
    }
}

/// LoRa coding rate, encoded as the HAL expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodingRate {
    Cr4_5 = 0x01,
    Cr4_6 = 0x02,
    Cr4_7 = 0x03,
    Cr4_8 = 0x04,
}

impl CodingRate {
    /// Parse "4/5" style notation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "4/5" => Some(Self::Cr4_5),
            "4/6" => Some(Self::Cr4_6),
            "4/7" => Some(Self::Cr4_7),
            "4/8" => Some(Self::Cr4_8),
            _ => None,
        }
    }
}

/// Frame handed down to the concentrator.
#[derive(Debug, Clone, PartialEq)]
pub struct TxFrame {
    pub freq_hz: u32,
    pub tx_mode: TxMode,
    pub rf_chain: u8,
    pub rf_power_dbm: i8,
    pub modulation: Modulation,
    pub bandwidth: Bandwidth,
    pub spreading_factor: u8,
    pub coderate: CodingRate,
    pub invert_polarity: bool,
    pub payload: Vec<u8>,
}

/// Fixed downlink radio parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownlinkProfile {
    pub freq_hz: u32,
    pub spreading_factor: u8,
    pub bandwidth: Bandwidth,
    pub coderate: CodingRate,
    pub rf_power_dbm: i8,
    pub rf_chain: u8,
}

impl DownlinkProfile {
    /// US915 RX2: 923.3 MHz, SF12, 500 kHz.
    pub const RX2: Self = Self {
        freq_hz: 923_300_000,
        spreading_factor: 12,
        bandwidth: Bandwidth::Khz500,
        coderate: CodingRate::Cr4_5,
        rf_power_dbm: 26,
        rf_chain: 0,
    };

    /// Wrap `payload` in a frame on this profile. Downlinks always invert polarity.
    pub fn frame(&self, payload: Vec<u8>) -> TxFrame {
        TxFrame {
            freq_hz: self.freq_hz,
            tx_mode: TxMode::Immediate,
            rf_chain: self.rf_chain,
            rf_power_dbm: self.rf_power_dbm,
            modulation: Modulation::Lora,
            bandwidth: self.bandwidth,
            spreading_factor: self.spreading_factor,
            coderate: self.coderate,
            invert_polarity: true,
            payload,
        }
    }
}

impl Default for DownlinkProfile {
    fn default() -> Self {
        Self::RX2
    }
}

/// Concentrator HAL.
///
/// Implementations are blocking. `poll` must return promptly with `None`
/// when nothing has been received.
pub trait RadioPort: Send {
    /// Bring up the concentrator on the given SPI device index.
    fn initialize(&mut self, device_index: u8) -> Result<(), RadioError>;

    /// Fetch one received packet if any is pending.
    fn poll(&mut self) -> Result<Option<RawPacket>, RadioError>;

    /// Send a frame.
    fn transmit(&mut self, frame: &TxFrame) -> Result<(), RadioError>;

    /// Stop the concentrator and release the HAL.
    fn shutdown(&mut self) -> Result<(), RadioError>;
}

/// Radio shared between the poll loop and transmitters.
pub type SharedRadio = Arc<Mutex<dyn RadioPort>>;

/// Wrap a radio for sharing.
pub fn shared<R: RadioPort + 'static>(radio: R) -> SharedRadio {
    Arc::new(Mutex::new(radio))
}

/// Lock the radio, recovering from a poisoned mutex.
pub fn lock_radio<'a>(
    radio: &'a Mutex<dyn RadioPort + 'static>,
) -> MutexGuard<'a, dyn RadioPort + 'static> {
    match radio.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Radio mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Handle for sending frames.
///
/// Clones share one lock, so at most one transmission is in flight. The
/// lock is a fair tokio mutex: waiters are served in arrival order.
#[derive(Clone)]
pub struct Transmitter {
    radio: SharedRadio,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Transmitter {
    /// Create a transmitter for `radio` with its own transmit lock.
    pub fn new(radio: SharedRadio) -> Self {
        Self {
            radio,
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Send `frame`, waiting for any transmission ahead of it.
    ///
    /// Once the HAL call has started it runs to completion even if the
    /// caller is dropped.
    pub async fn transmit(&self, frame: TxFrame) -> Result<(), RadioError> {
        if frame.payload.len() > MAX_PAYLOAD {
            return Err(RadioError::PayloadTooLarge(frame.payload.len()));
        }

        let _guard = self.lock.lock().await;
        debug!(
            "TX {} bytes @ {} Hz SF{}",
            frame.payload.len(),
            frame.freq_hz,
            frame.spreading_factor
        );

        let radio = Arc::clone(&self.radio);
        tokio::task::spawn_blocking(move || lock_radio(&radio).transmit(&frame))
            .await
            .map_err(|e| RadioError::Task(e.to_string()))?
    }
}
