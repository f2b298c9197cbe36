//! Application payload decoding.
//!
//! Turning decrypted FRMPayload bytes into readings is device specific and
//! lives behind [`PayloadDecoder`]. Each device names its decoder with a
//! `decoder_path` from the configuration.

use serde_json::{json, Value};
use std::fmt;

use crate::readings::Readings;

/// Everything a decoder needs about one uplink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest<'a> {
    pub device: &'a str,
    pub decoder_path: &'a str,
    pub f_port: Option<u8>,
    pub f_cnt: u16,
    pub payload: &'a [u8],
}

/// Decoder failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub decoder_path: String,
    pub reason: String,
}

impl DecodeError {
    pub fn new(decoder_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            decoder_path: decoder_path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decoder {} failed: {}", self.decoder_path, self.reason)
    }
}

impl std::error::Error for DecodeError {}

/// Converts decrypted payloads into readings.
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, request: &DecodeRequest<'_>) -> Result<Readings, DecodeError>;
}

/// Decoder that reports the frame metadata and the payload as hex.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawPayloadDecoder;

impl PayloadDecoder for RawPayloadDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> Result<Readings, DecodeError> {
        let mut readings = Readings::new();
        readings.insert(
            "f_port".into(),
            request.f_port.map(Value::from).unwrap_or(Value::Null),
        );
        readings.insert("f_cnt".into(), json!(request.f_cnt));
        readings.insert("payload".into(), json!(hex::encode(request.payload)));
        Ok(readings)
    }
}
