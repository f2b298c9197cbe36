//! LoRaWAN 1.0.x cryptographic primitives.
//!
//! All primitives are AES-128 based: AES-CMAC truncated to 4 bytes for MICs,
//! single-block ECB for the join-accept body and session-key derivation, and
//! the counter-mode keystream defined for FRMPayload.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use cmac::{Cmac, Mac};
use std::fmt;

use super::types::{AesKey, DevAddr, DevNonce, JoinNonce, NetId, MIC_SIZE};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Cryptographic primitive errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material was rejected by the cipher.
    InvalidKeyLength,
    /// Input to a block operation was not a whole number of blocks.
    InvalidBlockLength(usize),
    /// No random bytes were available for a nonce or address.
    EntropyUnavailable,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidKeyLength => write!(f, "invalid AES key length"),
            CryptoError::InvalidBlockLength(len) => {
                write!(f, "{} bytes is not a multiple of the AES block size", len)
            }
            CryptoError::EntropyUnavailable => write!(f, "random source unavailable"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Frame direction for the FRMPayload keystream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Uplink = 0,
    Downlink = 1,
}

/// Session keys derived from a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    pub nwk_s_key: AesKey,
    pub app_s_key: AesKey,
}

fn cipher(key: &AesKey) -> Result<Aes128, CryptoError> {
    Aes128::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength)
}

fn cmac_truncated(key: &AesKey, msg: &[u8]) -> Result<[u8; MIC_SIZE], CryptoError> {
    let mut mac = <Cmac<Aes128> as KeyInit>::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::InvalidKeyLength)?;
    mac.update(msg);
    let tag = mac.finalize().into_bytes();

    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&tag[..MIC_SIZE]);
    Ok(mic)
}

/// MIC of a join request: CMAC(AppKey, MHDR | JoinEUI | DevEUI | DevNonce).
pub fn join_request_mic(app_key: &AesKey, msg: &[u8]) -> Result<[u8; MIC_SIZE], CryptoError> {
    cmac_truncated(app_key, msg)
}

/// MIC of a join accept: CMAC(AppKey, MHDR | JoinNonce | NetID | DevAddr | DLSettings | RxDelay).
pub fn join_accept_mic(app_key: &AesKey, msg: &[u8]) -> Result<[u8; MIC_SIZE], CryptoError> {
    cmac_truncated(app_key, msg)
}

/// Compare two MICs without short-circuiting on the first mismatch.
pub fn mic_matches(expected: &[u8], actual: &[u8]) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    expected
        .iter()
        .zip(actual)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Encrypt a join-accept body (everything after MHDR, MIC included).
///
/// The network applies AES *decrypt* so the device only needs the encrypt
/// direction to recover the plaintext.
pub fn encrypt_join_accept(app_key: &AesKey, body: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if body.is_empty() || body.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidBlockLength(body.len()));
    }
    let cipher = cipher(app_key)?;
    let mut out = body.to_vec();
    for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
        cipher.decrypt_block(Block::from_mut_slice(chunk));
    }
    Ok(out)
}

/// Inverse of [`encrypt_join_accept`], as performed by the device.
pub fn decrypt_join_accept(app_key: &AesKey, body: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if body.is_empty() || body.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidBlockLength(body.len()));
    }
    let cipher = cipher(app_key)?;
    let mut out = body.to_vec();
    for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
        cipher.encrypt_block(Block::from_mut_slice(chunk));
    }
    Ok(out)
}

fn derive_key(
    app_key: &AesKey,
    prefix: u8,
    join_nonce: JoinNonce,
    net_id: NetId,
    dev_nonce: DevNonce,
) -> Result<AesKey, CryptoError> {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = prefix;
    block[1..4].copy_from_slice(&join_nonce.to_wire());
    block[4..7].copy_from_slice(&net_id.to_wire());
    block[7..9].copy_from_slice(&dev_nonce.to_wire());

    cipher(app_key)?.encrypt_block(Block::from_mut_slice(&mut block));
    Ok(AesKey::new(block))
}

/// Derive NwkSKey (prefix 0x01) and AppSKey (prefix 0x02) from a join exchange.
pub fn derive_session_keys(
    app_key: &AesKey,
    join_nonce: JoinNonce,
    net_id: NetId,
    dev_nonce: DevNonce,
) -> Result<SessionKeys, CryptoError> {
    Ok(SessionKeys {
        nwk_s_key: derive_key(app_key, 0x01, join_nonce, net_id, dev_nonce)?,
        app_s_key: derive_key(app_key, 0x02, join_nonce, net_id, dev_nonce)?,
    })
}

/// Encrypt or decrypt an FRMPayload. The operation is its own inverse.
pub fn crypt_frm_payload(
    key: &AesKey,
    dev_addr: DevAddr,
    f_cnt: u32,
    direction: Direction,
    payload: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher(key)?;
    let mut out = Vec::with_capacity(payload.len());

    for (i, chunk) in payload.chunks(BLOCK_SIZE).enumerate() {
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = 0x01;
        block[5] = direction as u8;
        block[6..10].copy_from_slice(&dev_addr.to_wire());
        block[10..14].copy_from_slice(&f_cnt.to_le_bytes());
        // block counter starts at 1; payloads never exceed 255 blocks
        block[15] = (i + 1) as u8;

        cipher.encrypt_block(Block::from_mut_slice(&mut block));
        out.extend(chunk.iter().zip(block.iter()).map(|(p, k)| p ^ k));
    }
    Ok(out)
}
