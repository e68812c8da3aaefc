// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::{PublicPreKey, PublicSignedPreKey};
use crate::traits::CryptoProvider;

/// Public keys of a remote device, published in advance so sessions can be established while it
/// is offline.
///
/// Bundles with a one-time pre-key should be handed out exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreKeyBundle {
    identity_key: PublicKey,
    registration_id: u32,
    pre_key: Option<PublicPreKey>,
    signed_pre_key: PublicSignedPreKey,
}

impl PreKeyBundle {
    pub fn new(
        identity_key: PublicKey,
        registration_id: u32,
        pre_key: Option<PublicPreKey>,
        signed_pre_key: PublicSignedPreKey,
    ) -> Self {
        Self {
            identity_key,
            registration_id,
            pre_key,
            signed_pre_key,
        }
    }

    pub fn identity_key(&self) -> &PublicKey {
        &self.identity_key
    }

    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    pub fn pre_key(&self) -> Option<&PublicPreKey> {
        self.pre_key.as_ref()
    }

    pub fn signed_pre_key(&self) -> &PublicSignedPreKey {
        &self.signed_pre_key
    }

    /// Checks the signature of the signed pre-key against the identity key.
    pub fn verify<P: CryptoProvider>(&self, provider: &P) -> Result<(), KeyBundleError> {
        provider
            .verify_signature(
                &self.identity_key,
                self.signed_pre_key.public_key.as_bytes(),
                &self.signed_pre_key.signature,
            )
            .map_err(KeyBundleError::InvalidSignature)
    }
}

#[derive(Debug, Error)]
pub enum KeyBundleError {
    #[error("invalid signature on signed pre-key: {0}")]
    InvalidSignature(CryptoError),
}

#[cfg(test)]
mod tests {
    use crate::crypto::Crypto;
    use crate::key_bundle::PublicSignedPreKey;
    use crate::key_helper::{
        generate_identity_key_pair, generate_pre_key, generate_signed_pre_key,
    };

    use super::{KeyBundleError, PreKeyBundle};

    #[test]
    fn verify_signed_pre_key() {
        let crypto = Crypto::from_seed([1; 32]);

        let identity = generate_identity_key_pair(&crypto).unwrap();
        let pre_key = generate_pre_key(1, &crypto).unwrap();
        let signed_pre_key = generate_signed_pre_key(&identity, 1, &crypto).unwrap();

        let bundle = PreKeyBundle::new(
            *identity.public_key(),
            1234,
            Some(pre_key.to_public()),
            signed_pre_key.to_public(),
        );
        assert!(bundle.verify(&crypto).is_ok());

        // Signed pre-key which was not signed by the identity.
        let other_identity = generate_identity_key_pair(&crypto).unwrap();
        let bundle = PreKeyBundle::new(
            *other_identity.public_key(),
            1234,
            None,
            signed_pre_key.to_public(),
        );
        assert!(matches!(
            bundle.verify(&crypto),
            Err(KeyBundleError::InvalidSignature(_))
        ));

        // Signature over a different key.
        let other_pre_key = generate_pre_key(2, &crypto).unwrap();
        let bundle = PreKeyBundle::new(
            *identity.public_key(),
            1234,
            None,
            PublicSignedPreKey {
                key_id: 1,
                public_key: *other_pre_key.key_pair().public_key(),
                signature: *signed_pre_key.signature(),
            },
        );
        assert!(matches!(
            bundle.verify(&crypto),
            Err(KeyBundleError::InvalidSignature(_))
        ));
    }
}
