//! Join-request frame.
//!
//! ```text
//! | MHDR | JoinEUI (LE) | DevEUI (LE) | DevNonce (LE) | MIC |
//! |  1   |      8       |      8      |       2       |  4  |
//! ```

use super::crypto::{join_request_mic, mic_matches, CryptoError};
use super::types::{AesKey, DevNonce, Eui64, MType, MIC_SIZE};
use super::FrameError;

/// Total length of a join request including MHDR and MIC.
pub const JOIN_REQUEST_LEN: usize = 23;

/// Length of the MIC-covered prefix.
const SIGNED_LEN: usize = JOIN_REQUEST_LEN - MIC_SIZE;

/// A parsed join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub join_eui: Eui64,
    pub dev_eui: Eui64,
    pub dev_nonce: DevNonce,
    pub mic: [u8; MIC_SIZE],
    signed: [u8; SIGNED_LEN],
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

impl JoinRequest {
    /// Parse a join request from a received payload.
    ///
    /// Only the first 23 bytes are considered; the MIC sits at bytes 19..23.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() < JOIN_REQUEST_LEN {
            return Err(FrameError::MalformedFrame {
                expected: JOIN_REQUEST_LEN,
                actual: payload.len(),
            });
        }
        if payload[0] != MType::JoinRequest.mhdr() {
            return Err(FrameError::UnsupportedMType(payload[0]));
        }

        Ok(Self {
            join_eui: Eui64::from_wire(array(&payload[1..9])),
            dev_eui: Eui64::from_wire(array(&payload[9..17])),
            dev_nonce: DevNonce::from_wire(array(&payload[17..19])),
            mic: array(&payload[19..23]),
            signed: array(&payload[..SIGNED_LEN]),
        })
    }

    /// Check the MIC against `app_key`.
    pub fn verify(&self, app_key: &AesKey) -> Result<bool, CryptoError> {
        let computed = join_request_mic(app_key, &self.signed)?;
        Ok(mic_matches(&computed, &self.mic))
    }

    /// Build a signed join request, as an end device would.
    pub fn build(
        join_eui: Eui64,
        dev_eui: Eui64,
        dev_nonce: DevNonce,
        app_key: &AesKey,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut frame = Vec::with_capacity(JOIN_REQUEST_LEN);
        frame.push(MType::JoinRequest.mhdr());
        frame.extend_from_slice(&join_eui.to_wire());
        frame.extend_from_slice(&dev_eui.to_wire());
        frame.extend_from_slice(&dev_nonce.to_wire());
        let mic = join_request_mic(app_key, &frame)?;
        frame.extend_from_slice(&mic);
        Ok(frame)
    }
}
