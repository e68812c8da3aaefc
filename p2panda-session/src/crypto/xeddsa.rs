// SPDX-License-Identifier: MIT OR Apache-2.0

//! XEdDSA signatures over X25519 keys.
//!
//! Lets identity keys sign pre-keys while being the same keys used for Diffie-Hellman agreements
//! in the key exchange.
//!
//! <https://signal.org/docs/specifications/xeddsa/>
use std::fmt;

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::{EdwardsPoint, MontgomeryPoint, Scalar};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::crypto::sha2::sha2_512;
use crate::crypto::x25519::{PublicKey, SecretKey};
use crate::crypto::{Rng, RngError};
use crate::serde::{deserialize_hex, serialize_hex};

pub const SIGNATURE_SIZE: usize = 64;

const NONCE_SIZE: usize = 64;

/// Domain separation of the nonce hash, `2^256 - 2` in little-endian.
const HASH_1_PREFIX: [u8; 32] = {
    let mut prefix = [0xFF; 32];
    prefix[0] = 0xFE;
    prefix
};

/// `R || s`, both encoded in 32 bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct XSignature([u8; SIGNATURE_SIZE]);

impl XSignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; SIGNATURE_SIZE] {
        self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    fn split(&self) -> ([u8; 32], [u8; 32]) {
        let mut r = [0; 32];
        let mut s = [0; 32];
        r.copy_from_slice(&self.0[..32]);
        s.copy_from_slice(&self.0[32..]);
        (r, s)
    }
}

impl TryFrom<&[u8]> for XSignature {
    type Error = XEdDSAError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        value
            .try_into()
            .map(Self)
            .map_err(|_| XEdDSAError::InvalidArgument)
    }
}

impl fmt::Display for XSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for XSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for XSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        Self::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

/// Edwards public key `A` with cleared sign bit and the matching private scalar `a`.
fn calculate_key_pair(secret_key: &SecretKey) -> (CompressedEdwardsY, Scalar) {
    let k = Scalar::from_bytes_mod_order(*secret_key.as_bytes());
    let mut public_key = (&k * ED25519_BASEPOINT_TABLE).compress();

    let sign_bit = public_key.0[31] >> 7;
    public_key.0[31] &= 0x7F;
    let private_scalar = if sign_bit == 1 { -k } else { k };

    (public_key, private_scalar)
}

fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&sha2_512(parts))
}

pub fn xeddsa_sign(
    message: &[u8],
    secret_key: &SecretKey,
    rng: &Rng,
) -> Result<XSignature, XEdDSAError> {
    let nonce: [u8; NONCE_SIZE] = rng.random_array()?;
    let (public_key, a) = calculate_key_pair(secret_key);

    let r = hash_to_scalar(&[&HASH_1_PREFIX, a.as_bytes(), message, &nonce]);
    let cap_r = (&r * ED25519_BASEPOINT_TABLE).compress();
    let h = hash_to_scalar(&[cap_r.as_bytes(), public_key.as_bytes(), message]);
    let s = r + h * a;

    let mut signature = [0; SIGNATURE_SIZE];
    signature[..32].copy_from_slice(cap_r.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    Ok(XSignature(signature))
}

pub fn xeddsa_verify(
    message: &[u8],
    public_key: &PublicKey,
    signature: &XSignature,
) -> Result<(), XEdDSAError> {
    let (cap_r, mut s) = signature.split();

    // The highest bit is not part of the scalar, values of 2^253 and above are rejected.
    s[31] &= 0x7F;
    if s[31] & 0xE0 != 0 {
        return Err(XEdDSAError::InvalidArgument);
    }

    // Edwards point with sign bit 0 of the Montgomery u-coordinate.
    let a: EdwardsPoint = MontgomeryPoint(public_key.to_bytes())
        .to_edwards(0)
        .ok_or(XEdDSAError::InvalidArgument)?;

    let h = hash_to_scalar(&[&cap_r, a.compress().as_bytes(), message]);
    let r_check = EdwardsPoint::vartime_double_scalar_mul_basepoint(
        &h,
        &-a,
        &Scalar::from_bytes_mod_order(s),
    )
    .compress();

    if bool::from(r_check.as_bytes().ct_eq(&cap_r)) {
        Ok(())
    } else {
        Err(XEdDSAError::VerificationFailed)
    }
}

#[derive(Debug, Error)]
pub enum XEdDSAError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error("invalid xeddsa public key or signature")]
    InvalidArgument,

    #[error("signature does not match public key and bytes")]
    VerificationFailed,
}
