// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::crypto::x25519::{KeyPair, PublicKey};
use crate::crypto::xeddsa::XSignature;

/// Identifier of a one-time pre-key.
pub type PreKeyId = u32;

/// Identifier of a signed pre-key.
pub type SignedPreKeyId = u32;

/// Public part of a one-time pre-key as published in a key bundle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPreKey {
    pub key_id: PreKeyId,
    pub public_key: PublicKey,
}

/// Public part of a signed pre-key as published in a key bundle.
///
/// The signature is made over the public key bytes with the identity secret key of the owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSignedPreKey {
    pub key_id: SignedPreKeyId,
    pub public_key: PublicKey,
    pub signature: XSignature,
}

/// Locally kept one-time pre-key with its secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKey {
    key_id: PreKeyId,
    key_pair: KeyPair,
}

impl PreKey {
    pub fn new(key_id: PreKeyId, key_pair: KeyPair) -> Self {
        Self { key_id, key_pair }
    }

    pub fn key_id(&self) -> PreKeyId {
        self.key_id
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn to_public(&self) -> PublicPreKey {
        PublicPreKey {
            key_id: self.key_id,
            public_key: *self.key_pair.public_key(),
        }
    }
}

/// Locally kept signed pre-key with its secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKey {
    key_id: SignedPreKeyId,
    key_pair: KeyPair,
    signature: XSignature,
}

impl SignedPreKey {
    pub fn new(key_id: SignedPreKeyId, key_pair: KeyPair, signature: XSignature) -> Self {
        Self {
            key_id,
            key_pair,
            signature,
        }
    }

    pub fn key_id(&self) -> SignedPreKeyId {
        self.key_id
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn signature(&self) -> &XSignature {
        &self.signature
    }

    pub fn to_public(&self) -> PublicSignedPreKey {
        PublicSignedPreKey {
            key_id: self.key_id,
            public_key: *self.key_pair.public_key(),
            signature: self.signature,
        }
    }
}
