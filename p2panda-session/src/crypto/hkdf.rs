// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hashed Message Authentication Code (HMAC)-based key derivation function (HKDF) using
//! "hash-mode" with SHA256.
//!
//! <https://www.rfc-editor.org/rfc/rfc5869>
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

/// Size of each derived output key.
pub const HKDF_OUTPUT_SIZE: usize = 32;

/// Derives `N` consecutive 32-byte keys from the input key material.
///
/// The keys are the first `N * 32` bytes of the HKDF output stream, split into chunks.
pub fn hkdf<const N: usize>(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<[[u8; HKDF_OUTPUT_SIZE]; N], HkdfError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new(vec![0u8; N * HKDF_OUTPUT_SIZE]);
    hk.expand(info, &mut okm)
        .map_err(|_| HkdfError::InvalidArguments)?;

    let mut keys = [[0u8; HKDF_OUTPUT_SIZE]; N];
    for (key, chunk) in keys.iter_mut().zip(okm.chunks_exact(HKDF_OUTPUT_SIZE)) {
        key.copy_from_slice(chunk);
    }
    Ok(keys)
}

#[derive(Debug, Error)]
pub enum HkdfError {
    #[error("arguments too large for hkdf")]
    InvalidArguments,
}
