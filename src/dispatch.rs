//! Per-packet dispatch by message type.

use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::decoder::{DecodeError, DecodeRequest, PayloadDecoder};
use crate::device::DeviceRegistry;
use crate::join::{JoinError, JoinHandler};
use crate::lorawan::{CryptoError, DataUplink, DevAddr, FrameError, MType};
use crate::readings::ReadingsStore;
use crate::stats::GatewayStats;

/// Reasons a data uplink produces no readings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UplinkError {
    /// Frame too short or inconsistent.
    MalformedFrame(FrameError),
    /// No device currently holds this address. Routine on a shared band.
    UnknownDevAddr(DevAddr),
    /// FRMPayload could not be decrypted.
    DecryptFailed(CryptoError),
    /// The device's decoder rejected the payload.
    DecodeFailed(DecodeError),
}

impl fmt::Display for UplinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UplinkError::MalformedFrame(e) => write!(f, "malformed uplink: {}", e),
            UplinkError::UnknownDevAddr(addr) => write!(f, "uplink from unknown DevAddr {}", addr),
            UplinkError::DecryptFailed(e) => write!(f, "payload decryption failed: {}", e),
            UplinkError::DecodeFailed(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for UplinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UplinkError::MalformedFrame(e) => Some(e),
            UplinkError::DecryptFailed(e) => Some(e),
            UplinkError::DecodeFailed(e) => Some(e),
            UplinkError::UnknownDevAddr(_) => None,
        }
    }
}

/// Routes received frames to the join handler or the payload decoder.
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    readings: Arc<ReadingsStore>,
    joins: JoinHandler,
    decoder: Arc<dyn PayloadDecoder>,
    stats: Arc<GatewayStats>,
}

impl Dispatcher {
    /// Create a dispatcher that hands join requests to `joins` and stores decoded uplinks in `readings`.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        readings: Arc<ReadingsStore>,
        joins: JoinHandler,
        decoder: Arc<dyn PayloadDecoder>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            registry,
            readings,
            joins,
            decoder,
            stats,
        }
    }

    /// Handle one received frame. Errors are logged and counted, never returned.
    pub async fn dispatch(&self, payload: &[u8], received_at: Instant, cancel: &CancellationToken) {
        let Some(&mhdr) = payload.first() else {
            warn!("Received empty packet");
            GatewayStats::incr(&self.stats.unsupported_frames);
            return;
        };

        match MType::from_mhdr(mhdr) {
            Some(MType::JoinRequest) => {
                info!("Received join request");
                match self.joins.handle(payload, received_at, cancel).await {
                    Ok(_) => GatewayStats::incr(&self.stats.joins_accepted),
                    Err(JoinError::UnknownDevice(eui)) => {
                        debug!("Ignoring join request from unknown device {}", eui);
                        GatewayStats::incr(&self.stats.joins_rejected);
                    }
                    Err(JoinError::Cancelled) => {
                        info!("Join abandoned: shutdown before RX2 window");
                    }
                    Err(e @ JoinError::RadioTransmitFailed(_)) => {
                        error!("Couldn't handle join request: {}", e);
                        GatewayStats::incr(&self.stats.transmit_failures);
                    }
                    Err(e) => {
                        error!("Couldn't handle join request: {}", e);
                        GatewayStats::incr(&self.stats.joins_rejected);
                    }
                }
            }
            Some(MType::UnconfirmedDataUp) => {
                info!("Received data uplink");
                match self.handle_uplink(payload) {
                    Ok(_) => GatewayStats::incr(&self.stats.uplinks_decoded),
                    Err(UplinkError::UnknownDevAddr(addr)) => {
                        debug!("Ignoring uplink from unknown DevAddr {}", addr);
                        GatewayStats::incr(&self.stats.uplinks_failed);
                    }
                    Err(e) => {
                        error!("Error parsing uplink message: {}", e);
                        GatewayStats::incr(&self.stats.uplinks_failed);
                    }
                }
            }
            _ => {
                warn!("Received unsupported packet type 0x{:02X}", mhdr);
                GatewayStats::incr(&self.stats.unsupported_frames);
            }
        }
    }

    /// Decrypt and decode a data uplink, merging the readings.
    ///
    /// Returns the name of the device the readings were stored under.
    pub fn handle_uplink(&self, payload: &[u8]) -> Result<String, UplinkError> {
        let uplink = DataUplink::parse(payload).map_err(UplinkError::MalformedFrame)?;
        let (entry, session) = self
            .registry
            .lookup_by_dev_addr(&uplink.dev_addr)
            .ok_or(UplinkError::UnknownDevAddr(uplink.dev_addr))?;

        // Port 0 carries MAC commands, encrypted with the network key.
        let key = match uplink.f_port {
            Some(0) => &session.nwk_s_key,
            _ => &session.app_s_key,
        };
        let plaintext = uplink
            .decrypt_payload(key)
            .map_err(UplinkError::DecryptFailed)?;

        let device = entry.device();
        let readings = self
            .decoder
            .decode(&DecodeRequest {
                device: &device.name,
                decoder_path: &device.decoder_path,
                f_port: uplink.f_port,
                f_cnt: uplink.f_cnt,
                payload: &plaintext,
            })
            .map_err(UplinkError::DecodeFailed)?;

        debug!(
            "Uplink from {} (FCnt {}): {} readings",
            device.name,
            uplink.f_cnt,
            readings.len()
        );
        self.readings.merge(&device.name, readings);
        Ok(device.name.clone())
    }
}
