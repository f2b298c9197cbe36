//! Identifier, key and nonce types shared by the frame codecs.
//!
//! LoRaWAN puts every multi-byte field on the air little-endian, while
//! operators configure EUIs and addresses big-endian (the way they are printed
//! on device labels and in network-server consoles). All types here store the
//! big-endian form and convert at the wire boundary with `from_wire`/`to_wire`.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a Message Integrity Code in bytes.
pub const MIC_SIZE: usize = 4;

/// AES-128 key size in bytes.
pub const KEY_SIZE: usize = 16;

/// Return a copy of `bytes` in reverse order.
///
/// Used to convert between the little-endian wire order and the big-endian
/// order in which identifiers are configured.
pub fn reversed<const N: usize>(bytes: [u8; N]) -> [u8; N] {
    let mut out = bytes;
    out.reverse();
    out
}

/// LoRaWAN message type, taken from the MAC header (MHDR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MType {
    /// OTAA join request (device to network).
    JoinRequest = 0x00,
    /// Join accept (network to device).
    JoinAccept = 0x20,
    /// Unconfirmed data uplink.
    UnconfirmedDataUp = 0x40,
    /// Unconfirmed data downlink.
    UnconfirmedDataDown = 0x60,
    /// Confirmed data uplink.
    ConfirmedDataUp = 0x80,
    /// Confirmed data downlink.
    ConfirmedDataDown = 0xA0,
    /// Rejoin request.
    RejoinRequest = 0xC0,
    /// Proprietary frame.
    Proprietary = 0xE0,
}

impl MType {
    /// Match an MHDR byte exactly (LoRaWAN R1 major version).
    ///
    /// Any RFU or major bits set yield `None`.
    pub fn from_mhdr(mhdr: u8) -> Option<Self> {
        match mhdr {
            0x00 => Some(Self::JoinRequest),
            0x20 => Some(Self::JoinAccept),
            0x40 => Some(Self::UnconfirmedDataUp),
            0x60 => Some(Self::UnconfirmedDataDown),
            0x80 => Some(Self::ConfirmedDataUp),
            0xA0 => Some(Self::ConfirmedDataDown),
            0xC0 => Some(Self::RejoinRequest),
            0xE0 => Some(Self::Proprietary),
            _ => None,
        }
    }

    /// The MHDR byte for this message type.
    pub fn mhdr(self) -> u8 {
        self as u8
    }
}

/// 64-bit extended unique identifier (DevEUI / JoinEUI), big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eui64([u8; 8]);

impl Eui64 {
    /// Create from big-endian bytes (configuration order).
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create from little-endian bytes as they appear in a frame.
    pub fn from_wire(bytes: [u8; 8]) -> Self {
        Self(reversed(bytes))
    }

    /// Little-endian bytes for a frame.
    pub fn to_wire(self) -> [u8; 8] {
        reversed(self.0)
    }

    /// Big-endian bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eui64({})", self)
    }
}

/// 32-bit device address, big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevAddr([u8; 4]);

impl DevAddr {
    /// Create from big-endian bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Create from little-endian bytes as they appear in a frame.
    pub fn from_wire(bytes: [u8; 4]) -> Self {
        Self(reversed(bytes))
    }

    /// Little-endian bytes for a frame.
    pub fn to_wire(self) -> [u8; 4] {
        reversed(self.0)
    }

    /// Big-endian bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevAddr({})", self)
    }
}

/// AES-128 key (AppKey, AppSKey, NwkSKey).
///
/// Zeroed on drop. `Debug` never prints the key bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; KEY_SIZE]);

impl AesKey {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

/// Network-generated join nonce (JoinNonce / AppNonce), big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinNonce([u8; 3]);

impl JoinNonce {
    /// Create from big-endian bytes.
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    /// Create from little-endian wire bytes.
    pub fn from_wire(bytes: [u8; 3]) -> Self {
        Self(reversed(bytes))
    }

    /// Little-endian wire bytes.
    pub fn to_wire(self) -> [u8; 3] {
        reversed(self.0)
    }

    /// Big-endian bytes.
    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

/// 24-bit network identifier, big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetId([u8; 3]);

impl NetId {
    /// Create from big-endian bytes.
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    /// Create from little-endian wire bytes.
    pub fn from_wire(bytes: [u8; 3]) -> Self {
        Self(reversed(bytes))
    }

    /// Little-endian wire bytes.
    pub fn to_wire(self) -> [u8; 3] {
        reversed(self.0)
    }

    /// Big-endian bytes.
    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

/// Device-generated join nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevNonce(u16);

impl DevNonce {
    /// Create from a numeric value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Create from little-endian wire bytes.
    pub fn from_wire(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    /// Little-endian wire bytes.
    pub fn to_wire(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }

    /// Numeric value.
    pub fn value(self) -> u16 {
        self.0
    }
}
