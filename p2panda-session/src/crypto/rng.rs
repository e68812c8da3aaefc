// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Mutex;

use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::{SeedableRng, TryRngCore};
use thiserror::Error;

/// ChaCha20 CSPRNG, seeded from the operating system.
///
/// Key generation, registration ids and signature nonces all draw from it.
#[derive(Debug)]
pub struct Rng(Mutex<ChaCha20Rng>);

impl Default for Rng {
    fn default() -> Self {
        Self(Mutex::new(ChaCha20Rng::from_os_rng()))
    }
}

impl Rng {
    /// Deterministic generator, never use this outside of tests.
    #[cfg(any(test, feature = "test_utils"))]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(Mutex::new(ChaCha20Rng::from_seed(seed)))
    }

    pub fn random_array<const N: usize>(&self) -> Result<[u8; N], RngError> {
        let mut bytes = [0; N];
        self.0
            .lock()
            .map_err(|_| RngError::LockPoisoned)?
            .try_fill_bytes(&mut bytes)
            .map_err(|_| RngError::NotEnoughRandomness)?;
        Ok(bytes)
    }
}

#[derive(Debug, Error)]
pub enum RngError {
    #[error("rng lock is poisoned")]
    LockPoisoned,

    #[error("unable to collect enough randomness")]
    NotEnoughRandomness,
}

#[cfg(test)]
mod tests {
    use super::Rng;

    #[test]
    fn seeded_rng_is_deterministic() {
        let bytes: [u8; 64] = Rng::from_seed([7; 32]).random_array().unwrap();
        assert_eq!(bytes, Rng::from_seed([7; 32]).random_array().unwrap());

        let other: [u8; 64] = Rng::from_seed([8; 32]).random_array().unwrap();
        assert_ne!(bytes, other);

        // Consecutive draws differ.
        let rng = Rng::default();
        let first: [u8; 32] = rng.random_array().unwrap();
        let second: [u8; 32] = rng.random_array().unwrap();
        assert_ne!(first, second);
    }
}
