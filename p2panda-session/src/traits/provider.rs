// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::crypto::CryptoError;
use crate::crypto::aes::{AES_IV_SIZE, AES_KEY_SIZE};
use crate::crypto::hkdf::HKDF_OUTPUT_SIZE;
use crate::crypto::hmac::MAC_SIZE;
use crate::crypto::x25519::{KeyPair, PublicKey, SHARED_SECRET_SIZE, SecretKey};
use crate::crypto::xeddsa::XSignature;

/// Primitive operations consumed by the session protocol.
///
/// The protocol treats all of these as black boxes with fixed input and output sizes. They are
/// CPU-bound and do not suspend, the only suspension points of a session operation are calls
/// into the [`ProtocolStore`](crate::traits::ProtocolStore).
pub trait CryptoProvider {
    /// Generates a fresh X25519 key pair.
    fn create_key_pair(&self) -> Result<KeyPair, CryptoError>;

    /// X25519 Diffie-Hellman agreement.
    fn calculate_agreement(
        &self,
        their_public_key: &PublicKey,
        our_secret_key: &SecretKey,
    ) -> Result<[u8; SHARED_SECRET_SIZE], CryptoError>;

    /// XEdDSA signature with an X25519 secret key.
    fn calculate_signature(
        &self,
        secret_key: &SecretKey,
        bytes: &[u8],
    ) -> Result<XSignature, CryptoError>;

    /// Verifies an XEdDSA signature, fails if it is invalid.
    fn verify_signature(
        &self,
        public_key: &PublicKey,
        bytes: &[u8],
        signature: &XSignature,
    ) -> Result<(), CryptoError>;

    /// HMAC-SHA256.
    fn sign(&self, key: &[u8], bytes: &[u8]) -> Result<[u8; MAC_SIZE], CryptoError>;

    /// Verifies a MAC truncated to `length` bytes in constant time.
    fn verify_mac(
        &self,
        bytes: &[u8],
        key: &[u8],
        mac: &[u8],
        length: usize,
    ) -> Result<(), CryptoError>;

    fn encrypt(
        &self,
        key: &[u8; AES_KEY_SIZE],
        plaintext: &[u8],
        iv: &[u8; AES_IV_SIZE],
    ) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(
        &self,
        key: &[u8; AES_KEY_SIZE],
        ciphertext: &[u8],
        iv: &[u8; AES_IV_SIZE],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Derives `N` 32-byte keys with HKDF-SHA256.
    fn hkdf<const N: usize>(
        &self,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
    ) -> Result<[[u8; HKDF_OUTPUT_SIZE]; N], CryptoError>;

    fn hash(&self, bytes: &[&[u8]]) -> Result<Vec<u8>, CryptoError>;

    fn random_array<const N: usize>(&self) -> Result<[u8; N], CryptoError>;
}
