//! Gateway configuration.
//!
//! The configuration is a JSON document listing the end devices and the
//! board wiring. Everything is validated before any [`Device`] is built, so
//! the rest of the gateway only ever sees well-formed key material.
//!
//! # Components
//!
//! - [`device`] - per-device entries (join type, keys, decoder)
//! - [`gateway`] - the top-level document, radio and GPIO settings
//!
//! # Example
//!
//! ```
//! use sx1302_gateway::config::GatewayConfig;
//!
//! let config = GatewayConfig::from_json(r#"{
//!     "devices": [{
//!         "name": "soil",
//!         "decoder_path": "decoders/soil.js",
//!         "dev_eui": "70B3D57ED0051A2B",
//!         "app_key": "2B7E151628AED2A6ABF7158809CF4F3C"
//!     }]
//! }"#).unwrap();
//! assert_eq!(config.devices().unwrap().len(), 1);
//! ```
//!
//! [`Device`]: crate::device::Device

mod device;
mod gateway;

use std::fmt;

pub use device::{DeviceConfig, JOIN_TYPE_ABP, JOIN_TYPE_OTAA};
pub use gateway::{
    DownlinkConfig, GatewayConfig, DEFAULT_READINGS_PORT, DEFAULT_SHUTDOWN_GRACE_SECS,
};

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read.
    Io { path: String, reason: String },
    /// The document is not valid JSON for this schema.
    Parse(String),
    /// No devices configured.
    NoDevices,
    /// A device has an empty name.
    EmptyName,
    /// Two devices share a name.
    DuplicateName(String),
    /// A device has no decoder path.
    MissingDecoderPath { device: String },
    /// `join_type` is neither OTAA nor ABP.
    UnknownJoinType { device: String, value: String },
    /// A field required by the device's join type is absent.
    MissingField {
        device: String,
        field: &'static str,
    },
    /// A hex field has the wrong number of characters.
    InvalidLength {
        device: String,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A hex field contains non-hex characters.
    InvalidHex {
        device: String,
        field: &'static str,
    },
    /// Downlink radio parameters are out of range.
    InvalidDownlink(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, reason } => write!(f, "cannot read {}: {}", path, reason),
            ConfigError::Parse(e) => write!(f, "invalid configuration: {}", e),
            ConfigError::NoDevices => write!(f, "no devices configured"),
            ConfigError::EmptyName => write!(f, "device name must not be empty"),
            ConfigError::DuplicateName(name) => write!(f, "duplicate device name: {}", name),
            ConfigError::MissingDecoderPath { device } => {
                write!(f, "device {}: decoder_path is required", device)
            }
            ConfigError::UnknownJoinType { device, value } => write!(
                f,
                "device {}: join_type must be \"{}\" or \"{}\", got \"{}\"",
                device, JOIN_TYPE_OTAA, JOIN_TYPE_ABP, value
            ),
            ConfigError::MissingField { device, field } => {
                write!(f, "device {}: {} is required", device, field)
            }
            ConfigError::InvalidLength {
                device,
                field,
                expected,
                actual,
            } => write!(
                f,
                "device {}: {} must be {} hex characters, got {}",
                device, field, expected, actual
            ),
            ConfigError::InvalidHex { device, field } => {
                write!(f, "device {}: {} is not valid hex", device, field)
            }
            ConfigError::InvalidDownlink(e) => write!(f, "invalid downlink settings: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
