// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic algorithms and secure random number provider for `p2panda-session`.
//!
//! Following algorithms are used:
//! * ChaCha random number generator with 20 rounds
//! * ECDH key agreement with X25519
//! * XEdDSA signatures over X25519 keys
//! * HMAC with SHA256
//! * HKDF with SHA256
//! * AES-256-CBC with PKCS#7 padding
//! * SHA2-512 hashing function
use thiserror::Error;

use crate::crypto::aes::{AES_IV_SIZE, AES_KEY_SIZE, AesError, aes_decrypt, aes_encrypt};
use crate::crypto::hkdf::{HKDF_OUTPUT_SIZE, HkdfError, hkdf};
use crate::crypto::hmac::{MAC_SIZE, MacError, hmac_sign, hmac_verify};
use crate::crypto::sha2::sha2_512;
use crate::crypto::x25519::{KeyPair, PublicKey, SHARED_SECRET_SIZE, SecretKey, X25519Error};
use crate::crypto::xeddsa::{XEdDSAError, XSignature, xeddsa_sign, xeddsa_verify};
use crate::crypto::{Rng, RngError};
use crate::traits::CryptoProvider;

/// Default provider of all primitives used by sessions.
#[derive(Debug, Default)]
pub struct Crypto {
    rng: Rng,
}

#[cfg(any(test, feature = "test_utils"))]
impl Crypto {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Rng::from_seed(seed),
        }
    }
}

impl CryptoProvider for Crypto {
    fn create_key_pair(&self) -> Result<KeyPair, CryptoError> {
        let secret_key = SecretKey::from_bytes(self.rng.random_array()?);
        Ok(KeyPair::from_secret_key(secret_key))
    }

    fn calculate_agreement(
        &self,
        their_public_key: &PublicKey,
        our_secret_key: &SecretKey,
    ) -> Result<[u8; SHARED_SECRET_SIZE], CryptoError> {
        Ok(our_secret_key.calculate_agreement(their_public_key)?)
    }

    fn calculate_signature(
        &self,
        secret_key: &SecretKey,
        bytes: &[u8],
    ) -> Result<XSignature, CryptoError> {
        Ok(xeddsa_sign(bytes, secret_key, &self.rng)?)
    }

    fn verify_signature(
        &self,
        public_key: &PublicKey,
        bytes: &[u8],
        signature: &XSignature,
    ) -> Result<(), CryptoError> {
        Ok(xeddsa_verify(bytes, public_key, signature)?)
    }

    fn sign(&self, key: &[u8], bytes: &[u8]) -> Result<[u8; MAC_SIZE], CryptoError> {
        Ok(hmac_sign(key, bytes)?)
    }

    fn verify_mac(
        &self,
        bytes: &[u8],
        key: &[u8],
        mac: &[u8],
        length: usize,
    ) -> Result<(), CryptoError> {
        Ok(hmac_verify(key, bytes, mac, length)?)
    }

    fn encrypt(
        &self,
        key: &[u8; AES_KEY_SIZE],
        plaintext: &[u8],
        iv: &[u8; AES_IV_SIZE],
    ) -> Result<Vec<u8>, CryptoError> {
        Ok(aes_encrypt(key, plaintext, iv)?)
    }

    fn decrypt(
        &self,
        key: &[u8; AES_KEY_SIZE],
        ciphertext: &[u8],
        iv: &[u8; AES_IV_SIZE],
    ) -> Result<Vec<u8>, CryptoError> {
        Ok(aes_decrypt(key, ciphertext, iv)?)
    }

    fn hkdf<const N: usize>(
        &self,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
    ) -> Result<[[u8; HKDF_OUTPUT_SIZE]; N], CryptoError> {
        Ok(hkdf(ikm, salt, info)?)
    }

    fn hash(&self, bytes: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
        Ok(sha2_512(bytes).to_vec())
    }

    fn random_array<const N: usize>(&self) -> Result<[u8; N], CryptoError> {
        Ok(self.rng.random_array()?)
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error(transparent)]
    X25519(#[from] X25519Error),

    #[error(transparent)]
    XEdDSA(#[from] XEdDSAError),

    #[error(transparent)]
    Mac(#[from] MacError),

    #[error(transparent)]
    Aes(#[from] AesError),

    #[error(transparent)]
    Hkdf(#[from] HkdfError),
}
