//! LoRaWAN gateway for the SX1302 concentrator.
//!
//! Receives LoRaWAN frames from the concentrator, answers OTAA join requests
//! in the RX2 window, decrypts data uplinks and keeps the latest readings per
//! device. Everything except the HAL binding in [`radio::sx1302`] is
//! platform independent and tested on the host against a mock radio.

pub mod config;
pub mod decoder;
pub mod device;
pub mod dispatch;
pub mod gateway;
pub mod gpio;
pub mod join;
pub mod lorawan;
pub mod radio;
pub mod random;
pub mod readings;
pub mod server;
pub mod stats;

// Re-export commonly used items
pub use config::{ConfigError, DeviceConfig, GatewayConfig};
pub use decoder::{DecodeError, DecodeRequest, PayloadDecoder, RawPayloadDecoder};
pub use device::{Device, DeviceRegistry, JoinMode, RegistryError, Session};
pub use dispatch::{Dispatcher, UplinkError};
pub use gateway::{Gateway, GatewayError, GatewaySettings};
pub use join::{JoinAccepted, JoinError, JoinHandler};
pub use radio::{DownlinkProfile, RadioError, RadioPort, RawPacket, SharedRadio, TxFrame};
pub use random::{OsRandom, RandomSource};
pub use readings::{Readings, ReadingsStore};
pub use server::ReadingsServer;
pub use stats::{GatewayStats, StatsSnapshot};
