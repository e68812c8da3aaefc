// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256 in cipher block chaining (CBC) mode with PKCS#7 padding.
//!
//! CBC does not provide integrity. Callers authenticate ciphertexts with a MAC and verify it
//! before decrypting.
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

/// 256-bit key size.
pub const AES_KEY_SIZE: usize = 32;

/// 128-bit initialisation vector size.
pub const AES_IV_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub fn aes_encrypt(
    key: &[u8; AES_KEY_SIZE],
    plaintext: &[u8],
    iv: &[u8; AES_IV_SIZE],
) -> Result<Vec<u8>, AesError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| AesError::InvalidLength)?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub fn aes_decrypt(
    key: &[u8; AES_KEY_SIZE],
    ciphertext: &[u8],
    iv: &[u8; AES_IV_SIZE],
) -> Result<Vec<u8>, AesError> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| AesError::InvalidLength)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| AesError::DecryptionFailed)
}

#[derive(Debug, Error)]
pub enum AesError {
    #[error("invalid aes key or iv length")]
    InvalidLength,

    #[error("could not decrypt aes ciphertext")]
    DecryptionFailed,
}

#[cfg(test)]
mod tests {
    use super::{AesError, aes_decrypt, aes_encrypt};

    #[test]
    fn encrypt_decrypt() {
        let key = [1; 32];
        let iv = [2; 16];

        let ciphertext = aes_encrypt(&key, b"Hello, Panda!", &iv).unwrap();
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(aes_decrypt(&key, &ciphertext, &iv).unwrap(), b"Hello, Panda!");

        // Full block of padding is appended to block-aligned plaintexts.
        let ciphertext = aes_encrypt(&key, &[3; 16], &iv).unwrap();
        assert_eq!(ciphertext.len(), 32);
    }

    #[test]
    fn invalid_ciphertext() {
        let key = [1; 32];
        let iv = [2; 16];

        assert!(matches!(
            aes_decrypt(&key, &[0; 15], &iv),
            Err(AesError::DecryptionFailed)
        ));
        assert!(matches!(
            aes_decrypt(&key, &[], &iv),
            Err(AesError::DecryptionFailed)
        ));
    }
}
