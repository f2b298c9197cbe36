//! Gateway configuration file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{ConfigError, DeviceConfig};
use crate::device::Device;
use crate::gateway::GatewaySettings;
use crate::gpio::DEFAULT_RESET_PIN;
use crate::radio::{Bandwidth, CodingRate, DownlinkProfile};

/// Default port for the readings endpoint.
pub const DEFAULT_READINGS_PORT: u16 = 8080;

/// Default shutdown grace period in seconds.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

fn default_reset_pin() -> u8 {
    DEFAULT_RESET_PIN
}

fn default_true() -> bool {
    true
}

fn default_readings_port() -> u16 {
    DEFAULT_READINGS_PORT
}

fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

/// Downlink radio parameters. Missing fields take the RX2 defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownlinkConfig {
    pub freq_hz: u32,
    pub spreading_factor: u8,
    pub bandwidth_khz: u32,
    /// Coding rate as `"4/5"` .. `"4/8"`.
    pub coderate: String,
    pub rf_power_dbm: i8,
}

impl Default for DownlinkConfig {
    fn default() -> Self {
        Self {
            freq_hz: DownlinkProfile::RX2.freq_hz,
            spreading_factor: DownlinkProfile::RX2.spreading_factor,
            bandwidth_khz: 500,
            coderate: "4/5".into(),
            rf_power_dbm: DownlinkProfile::RX2.rf_power_dbm,
        }
    }
}

impl DownlinkConfig {
    /// Validate the fields and build the radio profile.
    pub fn to_profile(&self) -> Result<DownlinkProfile, ConfigError> {
        if !(5..=12).contains(&self.spreading_factor) {
            return Err(ConfigError::InvalidDownlink(format!(
                "spreading factor {} outside 5..=12",
                self.spreading_factor
            )));
        }
        let bandwidth = Bandwidth::from_khz(self.bandwidth_khz).ok_or_else(|| {
            ConfigError::InvalidDownlink(format!(
                "unsupported bandwidth {} kHz",
                self.bandwidth_khz
            ))
        })?;
        let coderate = CodingRate::parse(&self.coderate).ok_or_else(|| {
            ConfigError::InvalidDownlink(format!("unsupported coding rate {}", self.coderate))
        })?;

        Ok(DownlinkProfile {
            freq_hz: self.freq_hz,
            spreading_factor: self.spreading_factor,
            bandwidth,
            coderate,
            rf_power_dbm: self.rf_power_dbm,
            rf_chain: 0,
        })
    }
}

/// Top-level configuration.
///
/// ```json
/// {
///   "devices": [
///     { "name": "soil", "decoder_path": "decoders/soil.js",
///       "dev_eui": "70B3D57ED0051A2B", "app_key": "2B7E151628AED2A6ABF7158809CF4F3C" }
///   ],
///   "reset_pin": 23,
///   "readings_port": 8080
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub devices: Vec<DeviceConfig>,
    /// BCM pin wired to the concentrator reset line.
    #[serde(default = "default_reset_pin")]
    pub reset_pin: u8,
    /// BCM pin switching concentrator power, if the board has one.
    #[serde(default)]
    pub power_pin: Option<u8>,
    /// Raspberry Pi OS Bookworm or later (`pinctrl` instead of `raspi-gpio`).
    #[serde(default = "default_true")]
    pub bookworm: bool,
    /// SPI device index for the concentrator.
    #[serde(default)]
    pub device_index: u8,
    /// HTTP readings endpoint port, 0 to disable.
    #[serde(default = "default_readings_port")]
    pub readings_port: u16,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub downlink: Option<DownlinkConfig>,
}

impl GatewayConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every device and the radio settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.devices().map(|_| ())?;
        self.downlink_profile().map(|_| ())
    }

    /// Build all configured devices.
    pub fn devices(&self) -> Result<Vec<Device>, ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        let mut devices: Vec<Device> = Vec::with_capacity(self.devices.len());
        for cfg in &self.devices {
            let device = cfg.to_device()?;
            if devices.iter().any(|d| d.name == device.name) {
                return Err(ConfigError::DuplicateName(device.name));
            }
            devices.push(device);
        }
        Ok(devices)
    }

    /// Configured downlink profile, or the RX2 default when none is given.
    pub fn downlink_profile(&self) -> Result<DownlinkProfile, ConfigError> {
        match &self.downlink {
            Some(downlink) => downlink.to_profile(),
            None => Ok(DownlinkProfile::RX2),
        }
    }

    /// Gateway runtime settings derived from this configuration.
    pub fn settings(&self) -> Result<GatewaySettings, ConfigError> {
        Ok(GatewaySettings {
            device_index: self.device_index,
            downlink: self.downlink_profile()?,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            ..GatewaySettings::default()
        })
    }
}
