// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation of the local key material a party publishes and keeps.
use crate::crypto::CryptoError;
use crate::crypto::x25519::KeyPair;
use crate::key_bundle::{PreKey, PreKeyId, SignedPreKey, SignedPreKeyId};
use crate::traits::CryptoProvider;

/// Registration ids are 14-bit numbers.
const REGISTRATION_ID_MASK: u16 = 0x3fff;

/// Generates a long-term identity key pair.
pub fn generate_identity_key_pair<P: CryptoProvider>(provider: &P) -> Result<KeyPair, CryptoError> {
    provider.create_key_pair()
}

/// Generates a random registration id.
pub fn generate_registration_id<P: CryptoProvider>(provider: &P) -> Result<u32, CryptoError> {
    let bytes: [u8; 2] = provider.random_array()?;
    Ok(u32::from(u16::from_le_bytes(bytes) & REGISTRATION_ID_MASK))
}

pub fn generate_pre_key<P: CryptoProvider>(
    key_id: PreKeyId,
    provider: &P,
) -> Result<PreKey, CryptoError> {
    Ok(PreKey::new(key_id, provider.create_key_pair()?))
}

/// Generates a pre-key and signs its public key with the identity secret key.
pub fn generate_signed_pre_key<P: CryptoProvider>(
    identity_key_pair: &KeyPair,
    key_id: SignedPreKeyId,
    provider: &P,
) -> Result<SignedPreKey, CryptoError> {
    let key_pair = provider.create_key_pair()?;
    let signature = provider.calculate_signature(
        identity_key_pair.secret_key(),
        key_pair.public_key().as_bytes(),
    )?;
    Ok(SignedPreKey::new(key_id, key_pair, signature))
}

#[cfg(test)]
mod tests {
    use crate::crypto::Crypto;
    use crate::traits::CryptoProvider;

    use super::{
        generate_identity_key_pair, generate_pre_key, generate_registration_id,
        generate_signed_pre_key,
    };

    #[test]
    fn registration_ids_are_14_bit() {
        let crypto = Crypto::from_seed([1; 32]);
        for _ in 0..100 {
            assert!(generate_registration_id(&crypto).unwrap() <= 0x3fff);
        }
    }

    #[test]
    fn signed_pre_key_signature() {
        let crypto = Crypto::from_seed([1; 32]);

        let identity = generate_identity_key_pair(&crypto).unwrap();
        let signed_pre_key = generate_signed_pre_key(&identity, 7, &crypto).unwrap();
        assert_eq!(signed_pre_key.key_id(), 7);

        assert!(
            crypto
                .verify_signature(
                    identity.public_key(),
                    signed_pre_key.key_pair().public_key().as_bytes(),
                    signed_pre_key.signature(),
                )
                .is_ok()
        );
    }

    #[test]
    fn pre_keys_are_fresh() {
        let crypto = Crypto::from_seed([1; 32]);

        let pre_key_1 = generate_pre_key(1, &crypto).unwrap();
        let pre_key_2 = generate_pre_key(2, &crypto).unwrap();
        assert_eq!(pre_key_1.to_public().key_id, 1);
        assert_ne!(pre_key_1.key_pair(), pre_key_2.key_pair());
    }
}
