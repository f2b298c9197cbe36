//! SX1302 concentrator via libloragw.
//!
//! The channel plan and board configuration live in the C set-up shim
//! (`setUpGateway`), linked in by `build.rs` together with libloragw.

use log::{info, warn};
use std::os::raw::c_int;

use super::{RadioError, RadioPort, RawPacket, TxFrame, MAX_PAYLOAD};

const LGW_HAL_SUCCESS: c_int = 0;
const LGW_HAL_ERROR: c_int = -1;

const STAT_CRC_OK: u8 = 0x10;

/// Mirror of `struct lgw_pkt_rx_s`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LgwPktRx {
    pub freq_hz: u32,
    pub freq_offset: i32,
    pub if_chain: u8,
    pub status: u8,
    pub count_us: u32,
    pub rf_chain: u8,
    pub modem_id: u8,
    pub modulation: u8,
    pub bandwidth: u8,
    pub datarate: u32,
    pub coderate: u8,
    pub rssic: f32,
    pub rssis: f32,
    pub snr: f32,
    pub snr_min: f32,
    pub snr_max: f32,
    pub crc: u16,
    pub size: u16,
    pub payload: [u8; 256],
    pub ftime_received: bool,
    pub ftime: u32,
}

impl Default for LgwPktRx {
    fn default() -> Self {
        Self {
            freq_hz: 0,
            freq_offset: 0,
            if_chain: 0,
            status: 0,
            count_us: 0,
            rf_chain: 0,
            modem_id: 0,
            modulation: 0,
            bandwidth: 0,
            datarate: 0,
            coderate: 0,
            rssic: 0.0,
            rssis: 0.0,
            snr: 0.0,
            snr_min: 0.0,
            snr_max: 0.0,
            crc: 0,
            size: 0,
            payload: [0; 256],
            ftime_received: false,
            ftime: 0,
        }
    }
}

/// Mirror of `struct lgw_pkt_tx_s`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LgwPktTx {
    pub freq_hz: u32,
    pub tx_mode: u8,
    pub count_us: u32,
    pub rf_chain: u8,
    pub rf_power: i8,
    pub modulation: u8,
    pub freq_offset: i8,
    pub bandwidth: u8,
    pub datarate: u32,
    pub coderate: u8,
    pub invert_pol: bool,
    pub f_dev: u8,
    pub preamble: u16,
    pub no_crc: bool,
    pub no_header: bool,
    pub size: u16,
    pub payload: [u8; 256],
}

impl From<&TxFrame> for LgwPktTx {
    fn from(frame: &TxFrame) -> Self {
        let mut payload = [0u8; 256];
        let len = frame.payload.len().min(MAX_PAYLOAD);
        payload[..len].copy_from_slice(&frame.payload[..len]);
        Self {
            freq_hz: frame.freq_hz,
            tx_mode: frame.tx_mode as u8,
            count_us: 0,
            rf_chain: frame.rf_chain,
            rf_power: frame.rf_power_dbm,
            modulation: frame.modulation as u8,
            freq_offset: 0,
            bandwidth: frame.bandwidth as u8,
            datarate: frame.spreading_factor as u32,
            coderate: frame.coderate as u8,
            invert_pol: frame.invert_polarity,
            f_dev: 0,
            preamble: 8,
            no_crc: false,
            no_header: false,
            size: len as u16,
            payload,
        }
    }
}

extern "C" {
    /// Board shim: configures the channel plan and starts the HAL.
    #[link_name = "setUpGateway"]
    fn set_up_gateway(device_index: c_int) -> c_int;
    fn lgw_receive(max_pkt: u8, pkt_data: *mut LgwPktRx) -> c_int;
    fn lgw_send(pkt_data: *const LgwPktTx) -> c_int;
    fn lgw_stop() -> c_int;
}

/// SX1302 radio port.
#[derive(Debug, Default)]
pub struct Sx1302 {
    started: bool,
}

impl Sx1302 {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RadioPort for Sx1302 {
    fn initialize(&mut self, device_index: u8) -> Result<(), RadioError> {
        // SAFETY: plain C call with a scalar argument.
        let code = unsafe { set_up_gateway(device_index as c_int) };
        if code != LGW_HAL_SUCCESS {
            return Err(RadioError::Hal {
                op: "setUpGateway",
                code,
            });
        }
        self.started = true;
        info!("SX1302 started on device index {}", device_index);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<RawPacket>, RadioError> {
        if !self.started {
            return Err(RadioError::NotStarted);
        }

        let mut pkt = LgwPktRx::default();
        // SAFETY: `pkt` is a valid, writable buffer for exactly one packet.
        let count = unsafe { lgw_receive(1, &mut pkt) };
        if count == LGW_HAL_ERROR {
            return Err(RadioError::Hal {
                op: "lgw_receive",
                code: count,
            });
        }
        if count == 0 || pkt.size == 0 {
            return Ok(None);
        }
        if pkt.status != STAT_CRC_OK {
            warn!("Dropping packet with CRC status 0x{:02X}", pkt.status);
            return Ok(None);
        }

        let size = (pkt.size as usize).min(pkt.payload.len());
        Ok(Some(RawPacket {
            payload: pkt.payload[..size].to_vec(),
            freq_hz: pkt.freq_hz,
            rssi: pkt.rssic,
            snr: pkt.snr,
        }))
    }

    fn transmit(&mut self, frame: &TxFrame) -> Result<(), RadioError> {
        if !self.started {
            return Err(RadioError::NotStarted);
        }
        if frame.payload.len() > MAX_PAYLOAD {
            return Err(RadioError::PayloadTooLarge(frame.payload.len()));
        }

        let pkt = LgwPktTx::from(frame);
        // SAFETY: `pkt` outlives the call; the HAL copies the payload.
        let code = unsafe { lgw_send(&pkt) };
        if code != LGW_HAL_SUCCESS {
            return Err(RadioError::Hal {
                op: "lgw_send",
                code,
            });
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), RadioError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        // SAFETY: no arguments; HAL tolerates stop after start.
        let code = unsafe { lgw_stop() };
        if code != LGW_HAL_SUCCESS {
            return Err(RadioError::Hal {
                op: "lgw_stop",
                code,
            });
        }
        info!("SX1302 stopped");
        Ok(())
    }
}

impl Drop for Sx1302 {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("SX1302 stop on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::DownlinkProfile;

    #[test]
    fn test_tx_struct_conversion() {
        let frame = DownlinkProfile::RX2.frame(vec![0x20, 1, 2, 3]);
        let pkt = LgwPktTx::from(&frame);
        assert_eq!(pkt.freq_hz, 923_300_000);
        assert_eq!(pkt.datarate, 12);
        assert_eq!(pkt.bandwidth, 0x06);
        assert_eq!(pkt.modulation, 0x10);
        assert_eq!(pkt.rf_power, 26);
        assert!(pkt.invert_pol);
        assert_eq!(pkt.size, 4);
        assert_eq!(&pkt.payload[..4], &[0x20, 1, 2, 3]);
    }
}
