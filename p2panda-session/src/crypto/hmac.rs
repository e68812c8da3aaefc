// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed-hash message authentication code (HMAC) with SHA256.
//!
//! <https://www.rfc-editor.org/rfc/rfc2104>
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// 256-bit MAC size.
pub const MAC_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Computes the HMAC-SHA256 of `bytes` under `key`.
pub fn hmac_sign(key: &[u8], bytes: &[u8]) -> Result<[u8; MAC_SIZE], MacError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| MacError::InvalidKey)?;
    mac.update(bytes);
    Ok(mac.finalize().into_bytes().into())
}

/// Verifies that `mac` equals the first `length` bytes of the HMAC-SHA256 of `bytes` under `key`.
///
/// The comparison is constant-time.
pub fn hmac_verify(key: &[u8], bytes: &[u8], mac: &[u8], length: usize) -> Result<(), MacError> {
    if mac.len() != length || length == 0 || length > MAC_SIZE {
        return Err(MacError::InvalidLength(mac.len()));
    }
    let calculated = hmac_sign(key, bytes)?;
    if bool::from(calculated[..length].ct_eq(mac)) {
        Ok(())
    } else {
        Err(MacError::BadMac)
    }
}

#[derive(Debug, Error)]
pub enum MacError {
    #[error("invalid hmac key")]
    InvalidKey,

    #[error("invalid mac length {0}")]
    InvalidLength(usize),

    #[error("bad mac")]
    BadMac,
}

#[cfg(test)]
mod tests {
    use super::{MacError, hmac_sign, hmac_verify};

    #[test]
    fn rfc4231_test_case_2() {
        let mac = hmac_sign(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn truncated_verify() {
        let key = [7; 32];
        let mac = hmac_sign(&key, b"message").unwrap();

        assert!(hmac_verify(&key, b"message", &mac[..8], 8).is_ok());
        assert!(hmac_verify(&key, b"message", &mac, 32).is_ok());

        assert!(matches!(
            hmac_verify(&key, b"other message", &mac[..8], 8),
            Err(MacError::BadMac)
        ));
        assert!(matches!(
            hmac_verify(&[8; 32], b"message", &mac[..8], 8),
            Err(MacError::BadMac)
        ));
        assert!(matches!(
            hmac_verify(&key, b"message", &mac[..7], 8),
            Err(MacError::InvalidLength(7))
        ));
    }
}
