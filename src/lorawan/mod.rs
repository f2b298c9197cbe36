//! LoRaWAN 1.0.x frame codecs and cryptography.
//!
//! Covers the subset a single-gateway join server needs: parsing and
//! authenticating join requests, building encrypted join accepts, deriving
//! session keys and opening data uplinks.

pub mod crypto;
mod data_uplink;
mod join_accept;
mod join_request;
mod types;

use std::fmt;

pub use crypto::{
    crypt_frm_payload, derive_session_keys, mic_matches, CryptoError, Direction, SessionKeys,
};
pub use data_uplink::{DataUplink, MIN_DATA_LEN};
pub use join_accept::{JoinAccept, JOIN_ACCEPT_LEN};
pub use join_request::{JoinRequest, JOIN_REQUEST_LEN};
pub use types::{
    reversed, AesKey, DevAddr, DevNonce, Eui64, JoinNonce, MType, NetId, KEY_SIZE, MIC_SIZE,
};

/// Frame parsing and verification errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Frame shorter than its fixed layout requires.
    MalformedFrame { expected: usize, actual: usize },
    /// MHDR is not the message type this codec handles.
    UnsupportedMType(u8),
    /// MIC did not verify.
    InvalidMic,
    /// Underlying AES/CMAC failure.
    Crypto(CryptoError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::MalformedFrame { expected, actual } => {
                write!(f, "malformed frame: expected {} bytes, got {}", expected, actual)
            }
            FrameError::UnsupportedMType(mhdr) => write!(f, "unsupported MHDR 0x{:02X}", mhdr),
            FrameError::InvalidMic => write!(f, "MIC mismatch"),
            FrameError::Crypto(e) => write!(f, "crypto error: {}", e),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<CryptoError> for FrameError {
    fn from(e: CryptoError) -> Self {
        FrameError::Crypto(e)
    }
}
