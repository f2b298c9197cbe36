//! Randomness for join nonces and device addresses.

use log::debug;
use rand_core::{OsRng, RngCore};

use crate::lorawan::CryptoError;

/// Source of random bytes for the join procedure.
pub trait RandomSource: Send + Sync {
    /// Fill `dest` entirely, or fail with [`CryptoError::EntropyUnavailable`].
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError>;
}

/// Operating-system randomness.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        OsRng.try_fill_bytes(dest).map_err(|e| {
            debug!("OS random source failed: {}", e);
            CryptoError::EntropyUnavailable
        })
    }
}
