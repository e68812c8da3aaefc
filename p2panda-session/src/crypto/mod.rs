// SPDX-License-Identifier: MIT OR Apache-2.0

//! Implementations of all cryptographic algorithms required for sessions.
pub mod aes;
pub mod hkdf;
pub mod hmac;
mod provider;
mod rng;
mod secret;
pub mod sha2;
pub mod x25519;
pub mod xeddsa;

pub use provider::{Crypto, CryptoError};
pub use rng::{Rng, RngError};
pub use secret::Secret;
