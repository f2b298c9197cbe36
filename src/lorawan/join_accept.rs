//! Join-accept frame.
//!
//! ```text
//! | MHDR | JoinNonce | NetID | DevAddr | DLSettings | RxDelay | MIC |
//! |  1   |     3     |   3   |    4    |     1      |    1    |  4  |
//! ```
//!
//! Everything after MHDR (16 bytes, MIC included) is encrypted with the AppKey.
//! No CFList is emitted.

use super::crypto::{
    decrypt_join_accept, encrypt_join_accept, join_accept_mic, mic_matches, CryptoError,
};
use super::types::{AesKey, DevAddr, JoinNonce, MType, NetId, MIC_SIZE};
use super::FrameError;

/// Length of an encoded join accept without CFList.
pub const JOIN_ACCEPT_LEN: usize = 17;

const SIGNED_LEN: usize = JOIN_ACCEPT_LEN - MIC_SIZE;

/// Join-accept fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAccept {
    pub join_nonce: JoinNonce,
    pub net_id: NetId,
    pub dev_addr: DevAddr,
    pub dl_settings: u8,
    pub rx_delay: u8,
}

impl JoinAccept {
    /// The MIC-covered plaintext: MHDR followed by the fields in wire order.
    fn signed_bytes(&self) -> [u8; SIGNED_LEN] {
        let mut out = [0u8; SIGNED_LEN];
        out[0] = MType::JoinAccept.mhdr();
        out[1..4].copy_from_slice(&self.join_nonce.to_wire());
        out[4..7].copy_from_slice(&self.net_id.to_wire());
        out[7..11].copy_from_slice(&self.dev_addr.to_wire());
        out[11] = self.dl_settings;
        out[12] = self.rx_delay;
        out
    }

    /// Sign and encrypt into a ready-to-transmit frame.
    pub fn encode(&self, app_key: &AesKey) -> Result<Vec<u8>, CryptoError> {
        let signed = self.signed_bytes();
        let mic = join_accept_mic(app_key, &signed)?;

        let mut body = Vec::with_capacity(JOIN_ACCEPT_LEN - 1);
        body.extend_from_slice(&signed[1..]);
        body.extend_from_slice(&mic);

        let mut frame = Vec::with_capacity(JOIN_ACCEPT_LEN);
        frame.push(signed[0]);
        frame.extend(encrypt_join_accept(app_key, &body)?);
        Ok(frame)
    }

    /// Decrypt and verify a frame produced by [`JoinAccept::encode`].
    pub fn decrypt(frame: &[u8], app_key: &AesKey) -> Result<Self, FrameError> {
        if frame.len() != JOIN_ACCEPT_LEN {
            return Err(FrameError::MalformedFrame {
                expected: JOIN_ACCEPT_LEN,
                actual: frame.len(),
            });
        }
        if frame[0] != MType::JoinAccept.mhdr() {
            return Err(FrameError::UnsupportedMType(frame[0]));
        }

        let body = decrypt_join_accept(app_key, &frame[1..])?;
        let mut signed = [0u8; SIGNED_LEN];
        signed[0] = frame[0];
        signed[1..].copy_from_slice(&body[..SIGNED_LEN - 1]);

        let computed = join_accept_mic(app_key, &signed)?;
        if !mic_matches(&computed, &body[SIGNED_LEN - 1..]) {
            return Err(FrameError::InvalidMic);
        }

        let mut join_nonce = [0u8; 3];
        join_nonce.copy_from_slice(&signed[1..4]);
        let mut net_id = [0u8; 3];
        net_id.copy_from_slice(&signed[4..7]);
        let mut dev_addr = [0u8; 4];
        dev_addr.copy_from_slice(&signed[7..11]);

        Ok(Self {
            join_nonce: JoinNonce::from_wire(join_nonce),
            net_id: NetId::from_wire(net_id),
            dev_addr: DevAddr::from_wire(dev_addr),
            dl_settings: signed[11],
            rx_delay: signed[12],
        })
    }
}
