//! Data uplink frame.
//!
//! ```text
//! | MHDR | DevAddr | FCtrl | FCnt | FOpts | FPort | FRMPayload | MIC |
//! |  1   |    4    |   1   |  2   | 0..15 |  0/1  |     n      |  4  |
//! ```

use super::crypto::{crypt_frm_payload, CryptoError, Direction};
use super::types::{AesKey, DevAddr, MType, MIC_SIZE};
use super::FrameError;

/// Shortest valid data frame: MHDR, FHDR without options, MIC.
pub const MIN_DATA_LEN: usize = 12;

const FHDR_END: usize = 8;

/// A parsed uplink data frame. The payload is still encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUplink {
    pub mtype: MType,
    pub dev_addr: DevAddr,
    pub f_ctrl: u8,
    pub f_cnt: u16,
    pub f_opts: Vec<u8>,
    pub f_port: Option<u8>,
    pub frm_payload: Vec<u8>,
    pub mic: [u8; MIC_SIZE],
}

impl DataUplink {
    /// Parse an unconfirmed or confirmed data uplink.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < MIN_DATA_LEN {
            return Err(FrameError::MalformedFrame {
                expected: MIN_DATA_LEN,
                actual: payload.len(),
            });
        }
        let mtype = match MType::from_mhdr(payload[0]) {
            Some(m @ (MType::UnconfirmedDataUp | MType::ConfirmedDataUp)) => m,
            _ => return Err(FrameError::UnsupportedMType(payload[0])),
        };

        let mut dev_addr = [0u8; 4];
        dev_addr.copy_from_slice(&payload[1..5]);
        let f_ctrl = payload[5];
        let f_cnt = u16::from_le_bytes([payload[6], payload[7]]);

        let mic_start = payload.len() - MIC_SIZE;
        let opts_end = FHDR_END + (f_ctrl & 0x0F) as usize;
        if opts_end > mic_start {
            return Err(FrameError::MalformedFrame {
                expected: opts_end + MIC_SIZE,
                actual: payload.len(),
            });
        }

        let (f_port, frm_payload) = if opts_end < mic_start {
            (
                Some(payload[opts_end]),
                payload[opts_end + 1..mic_start].to_vec(),
            )
        } else {
            (None, Vec::new())
        };

        let mut mic = [0u8; MIC_SIZE];
        mic.copy_from_slice(&payload[mic_start..]);

        Ok(Self {
            mtype,
            dev_addr: DevAddr::from_wire(dev_addr),
            f_ctrl,
            f_cnt,
            f_opts: payload[FHDR_END..opts_end].to_vec(),
            f_port,
            frm_payload,
            mic,
        })
    }

    /// Decrypt FRMPayload with the given session key.
    ///
    /// Only the low 16 bits of the frame counter are on the wire; they are
    /// used as-is.
    pub fn decrypt_payload(&self, key: &AesKey) -> Result<Vec<u8>, CryptoError> {
        crypt_frm_payload(
            key,
            self.dev_addr,
            self.f_cnt as u32,
            Direction::Uplink,
            &self.frm_payload,
        )
    }
}
