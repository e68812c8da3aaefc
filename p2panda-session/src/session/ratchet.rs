// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diffie-Hellman and symmetric-key ratchet steps operating on a [`SessionState`].
use thiserror::Error;
use tracing::debug;

use crate::crypto::aes::{AES_IV_SIZE, AES_KEY_SIZE};
use crate::crypto::x25519::PublicKey;
use crate::crypto::{CryptoError, Secret};
use crate::session::record::{
    CHAIN_KEY_SIZE, Chain, ChainType, MESSAGE_KEY_SIZE, OldRatchet, SessionState, now,
};
use crate::traits::CryptoProvider;

const RATCHET_INFO: &[u8] = b"WhisperRatchet";

const MESSAGE_KEYS_INFO: &[u8] = b"WhisperMessageKeys";

/// HMAC input deriving the message key from a chain key.
const MESSAGE_KEY_SEED: [u8; 1] = [1];

/// HMAC input deriving the next chain key from a chain key.
const CHAIN_KEY_SEED: [u8; 1] = [2];

pub const MAC_KEY_SIZE: usize = 32;

/// Keys used to encrypt and authenticate exactly one message.
pub struct MessageKeys {
    pub(crate) cipher_key: Secret<AES_KEY_SIZE>,
    pub(crate) mac_key: Secret<MAC_KEY_SIZE>,
    pub(crate) iv: [u8; AES_IV_SIZE],
}

/// Ratchet advancing the chains of a session.
///
/// Every new ephemeral key of the remote party triggers a Diffie-Hellman step, deriving a fresh
/// receiving chain for their key and a fresh sending chain for a newly generated key of ours. In
/// between, every message moves the symmetric-key chain one step forward:
///
/// ```text
///   chain key 0 --HMAC(2)--> chain key 1 --HMAC(2)--> chain key 2 ...
///        |                        |
///     HMAC(1)                  HMAC(1)
///        |                        |
///   message key 0            message key 1
/// ```
///
/// Message keys of skipped messages are kept on the chain until they are used or the chain gets
/// evicted.
pub struct SessionRatchet;

impl SessionRatchet {
    /// Derives a new chain from the agreement between `remote_key` and our current ephemeral key
    /// and moves the root key forward.
    ///
    /// Sending chains are stored under our ephemeral public key, receiving chains under the
    /// remote key.
    pub fn calculate_ratchet<P: CryptoProvider>(
        provider: &P,
        session: &mut SessionState,
        remote_key: &PublicKey,
        sending: bool,
    ) -> Result<(), RatchetError> {
        let ratchet = &session.current_ratchet;
        let shared_secret =
            provider.calculate_agreement(remote_key, ratchet.ephemeral_key_pair.secret_key())?;
        let [root_key, chain_key] =
            provider.hkdf::<2>(&shared_secret, ratchet.root_key.as_bytes(), RATCHET_INFO)?;

        let (chain_id, chain_type) = if sending {
            (*ratchet.ephemeral_public_key(), ChainType::Sending)
        } else {
            (*remote_key, ChainType::Receiving)
        };

        session
            .chains
            .insert(chain_id, Chain::new(chain_key, chain_type));
        session.current_ratchet.root_key = Secret::from_bytes(root_key);

        Ok(())
    }

    /// Performs a Diffie-Hellman step if the remote party moved on to a new ephemeral key.
    ///
    /// Keys of messages still missing on the previous receiving chain are derived up to
    /// `previous_counter` before that chain gets closed.
    pub fn maybe_step_ratchet<P: CryptoProvider>(
        provider: &P,
        session: &mut SessionState,
        remote_key: &PublicKey,
        previous_counter: u32,
        max_message_keys_skip: u32,
    ) -> Result<(), RatchetError> {
        if session.chains.contains_key(remote_key) {
            return Ok(());
        }

        debug!(%remote_key, "new remote ephemeral key");

        let last_remote_key = session.current_ratchet.last_remote_ephemeral_key;
        if let Some(previous_chain) = session.chains.get_mut(&last_remote_key) {
            Self::fill_message_keys(
                provider,
                previous_chain,
                previous_counter,
                max_message_keys_skip,
            )?;
            previous_chain.close();
            session.old_ratchet_list.push(OldRatchet {
                added: now(),
                ephemeral_key: last_remote_key,
            });
        }

        Self::calculate_ratchet(provider, session, remote_key, false)?;

        // Our sending chain is replaced, remember its length for the remote party.
        let our_key = *session.current_ratchet.ephemeral_public_key();
        if let Some(sending_chain) = session.chains.remove(&our_key) {
            session.current_ratchet.previous_counter =
                u32::try_from(sending_chain.counter()).unwrap_or_default();
        }

        session.current_ratchet.ephemeral_key_pair = provider.create_key_pair()?;
        Self::calculate_ratchet(provider, session, remote_key, true)?;
        session.current_ratchet.last_remote_ephemeral_key = *remote_key;

        Ok(())
    }

    /// Advances the chain until a message key for `counter` exists.
    ///
    /// Leaves the chain untouched when the counter is too far ahead or the chain is closed.
    pub fn fill_message_keys<P: CryptoProvider>(
        provider: &P,
        chain: &mut Chain,
        counter: u32,
        max_message_keys_skip: u32,
    ) -> Result<(), RatchetError> {
        let target = i64::from(counter);
        if chain.chain_key.counter >= target {
            return Ok(());
        }

        if target - chain.chain_key.counter > i64::from(max_message_keys_skip) {
            return Err(RatchetError::TooFarIntoFuture(max_message_keys_skip));
        }

        let Some(chain_key) = chain.chain_key.key.as_ref() else {
            return Err(RatchetError::ChainClosed);
        };

        let mut chain_key: Secret<CHAIN_KEY_SIZE> = chain_key.clone();
        let mut message_keys = Vec::new();
        let mut next_counter = chain.chain_key.counter;
        while next_counter < target {
            next_counter += 1;
            let message_key = provider.sign(chain_key.as_bytes(), &MESSAGE_KEY_SEED)?;
            chain_key = Secret::from_bytes(provider.sign(chain_key.as_bytes(), &CHAIN_KEY_SEED)?);
            message_keys.push((next_counter, message_key));
        }

        for (counter, message_key) in message_keys {
            // Counters between 0 and `target` always fit.
            let counter = u32::try_from(counter).unwrap_or_default();
            chain
                .message_keys
                .insert(counter, Secret::from_bytes(message_key));
        }
        chain.chain_key.counter = target;
        chain.chain_key.key = Some(chain_key);

        Ok(())
    }

    /// Expands a message key into cipher key, MAC key and IV.
    pub fn derive_message_keys<P: CryptoProvider>(
        provider: &P,
        message_key: &Secret<MESSAGE_KEY_SIZE>,
    ) -> Result<MessageKeys, RatchetError> {
        let [cipher_key, mac_key, iv] =
            provider.hkdf::<3>(message_key.as_bytes(), &[0; 32], MESSAGE_KEYS_INFO)?;

        let mut iv_bytes = [0; AES_IV_SIZE];
        iv_bytes.copy_from_slice(&iv[..AES_IV_SIZE]);

        Ok(MessageKeys {
            cipher_key: Secret::from_bytes(cipher_key),
            mac_key: Secret::from_bytes(mac_key),
            iv: iv_bytes,
        })
    }
}

#[derive(Debug, Error)]
pub enum RatchetError {
    #[error("over {0} messages into the future")]
    TooFarIntoFuture(u32),

    #[error("chain closed")]
    ChainClosed,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[cfg(test)]
mod tests {
    use crate::crypto::x25519::{KeyPair, PublicKey};
    use crate::crypto::{Crypto, Secret};
    use crate::session::record::{
        BaseKeyType, Chain, ChainType, IndexInfo, Ratchet, SessionState,
    };
    use crate::traits::CryptoProvider;

    use super::{RatchetError, SessionRatchet};

    fn chain(crypto: &Crypto) -> Chain {
        Chain::new(crypto.random_array().unwrap(), ChainType::Receiving)
    }

    #[test]
    fn fill_message_keys() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut chain = chain(&crypto);
        assert_eq!(chain.counter(), -1);

        SessionRatchet::fill_message_keys(&crypto, &mut chain, 2, 2000).unwrap();
        assert_eq!(chain.counter(), 2);
        assert!(chain.has_message_key(0));
        assert!(chain.has_message_key(1));
        assert!(chain.has_message_key(2));

        // Filling up to an already derived counter is a no-op.
        let before = chain.clone();
        SessionRatchet::fill_message_keys(&crypto, &mut chain, 1, 2000).unwrap();
        assert_eq!(chain, before);
    }

    #[test]
    fn chain_derivation_is_deterministic() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut chain_1 = chain(&crypto);
        let mut chain_2 = chain_1.clone();

        // Derive keys step by step on one chain, in one go on the other.
        for counter in 0..5 {
            SessionRatchet::fill_message_keys(&crypto, &mut chain_1, counter, 2000).unwrap();
        }
        SessionRatchet::fill_message_keys(&crypto, &mut chain_2, 4, 2000).unwrap();
        assert_eq!(chain_1, chain_2);

        // Every message key is different.
        let keys: Vec<_> = chain_1.message_keys.values().collect();
        for (i, key) in keys.iter().enumerate() {
            for other in &keys[i + 1..] {
                assert_ne!(key, other);
            }
        }
    }

    #[test]
    fn too_far_into_the_future() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut chain = chain(&crypto);

        // From counter -1 up to 1999 is a gap of exactly 2000.
        let mut accepted = chain.clone();
        SessionRatchet::fill_message_keys(&crypto, &mut accepted, 1999, 2000).unwrap();
        assert_eq!(accepted.message_keys.len(), 2000);

        let before = chain.clone();
        assert!(matches!(
            SessionRatchet::fill_message_keys(&crypto, &mut chain, 2000, 2000),
            Err(RatchetError::TooFarIntoFuture(2000))
        ));
        assert_eq!(chain, before);
    }

    #[test]
    fn closed_chain() {
        let crypto = Crypto::from_seed([1; 32]);
        let mut chain = chain(&crypto);
        SessionRatchet::fill_message_keys(&crypto, &mut chain, 1, 2000).unwrap();
        chain.close();

        // Already derived keys stay available.
        SessionRatchet::fill_message_keys(&crypto, &mut chain, 1, 2000).unwrap();
        assert!(chain.has_message_key(0));

        assert!(matches!(
            SessionRatchet::fill_message_keys(&crypto, &mut chain, 2, 2000),
            Err(RatchetError::ChainClosed)
        ));
    }

    #[test]
    fn sending_and_receiving_chains_match() {
        let crypto = Crypto::from_seed([1; 32]);
        let root_key: [u8; 32] = crypto.random_array().unwrap();
        let alice_ephemeral = crypto.create_key_pair().unwrap();
        let bob_ephemeral = crypto.create_key_pair().unwrap();

        let session = |ephemeral_key_pair: KeyPair, remote_key: PublicKey| {
            SessionState::new(
                Some(1),
                Ratchet {
                    root_key: Secret::from_bytes(root_key),
                    ephemeral_key_pair,
                    last_remote_ephemeral_key: remote_key,
                    previous_counter: 0,
                },
                IndexInfo {
                    remote_identity_key: remote_key,
                    base_key: remote_key,
                    base_key_type: BaseKeyType::Theirs,
                    closed: None,
                },
            )
        };

        let mut alice = session(alice_ephemeral.clone(), *bob_ephemeral.public_key());
        let mut bob = session(bob_ephemeral.clone(), *alice_ephemeral.public_key());

        SessionRatchet::calculate_ratchet(&crypto, &mut alice, bob_ephemeral.public_key(), true)
            .unwrap();
        SessionRatchet::calculate_ratchet(
            &crypto,
            &mut bob,
            alice_ephemeral.public_key(),
            false,
        )
        .unwrap();

        let sending = alice.chain(alice_ephemeral.public_key()).unwrap();
        let receiving = bob.chain(alice_ephemeral.public_key()).unwrap();
        assert_eq!(sending.chain_type(), ChainType::Sending);
        assert_eq!(receiving.chain_type(), ChainType::Receiving);
        assert_eq!(sending.chain_key, receiving.chain_key);
        assert_eq!(
            alice.current_ratchet().root_key(),
            bob.current_ratchet().root_key()
        );
        assert_ne!(alice.current_ratchet().root_key(), &root_key);
    }

    #[test]
    fn step_ratchet() {
        let crypto = Crypto::from_seed([1; 32]);
        let our_ephemeral = crypto.create_key_pair().unwrap();
        let first_remote = *crypto.create_key_pair().unwrap().public_key();
        let second_remote = *crypto.create_key_pair().unwrap().public_key();

        let mut session = SessionState::new(
            Some(1),
            Ratchet {
                root_key: Secret::from_bytes(crypto.random_array().unwrap()),
                ephemeral_key_pair: our_ephemeral.clone(),
                last_remote_ephemeral_key: first_remote,
                previous_counter: 0,
            },
            IndexInfo {
                remote_identity_key: first_remote,
                base_key: first_remote,
                base_key_type: BaseKeyType::Ours,
                closed: None,
            },
        );

        // Sending chain on which we sent three messages.
        SessionRatchet::calculate_ratchet(&crypto, &mut session, &first_remote, true).unwrap();
        let sending = session.chain_mut(our_ephemeral.public_key()).unwrap();
        SessionRatchet::fill_message_keys(&crypto, sending, 2, 2000).unwrap();

        // First message of the remote party.
        SessionRatchet::maybe_step_ratchet(&crypto, &mut session, &first_remote, 0, 2000)
            .unwrap();
        assert_eq!(session.current_ratchet().previous_counter(), 2);
        assert!(session.chain(our_ephemeral.public_key()).is_none());
        assert_ne!(
            session.current_ratchet().ephemeral_public_key(),
            our_ephemeral.public_key()
        );
        assert_eq!(
            session.current_ratchet().last_remote_ephemeral_key(),
            &first_remote
        );
        let new_ephemeral = *session.current_ratchet().ephemeral_public_key();
        assert_eq!(
            session.chain(&new_ephemeral).unwrap().chain_type(),
            ChainType::Sending
        );

        // Same key again does not step.
        let before = session.clone();
        SessionRatchet::maybe_step_ratchet(&crypto, &mut session, &first_remote, 0, 2000)
            .unwrap();
        assert_eq!(session, before);

        // Remote party moves on after sending two messages, the old chain gets filled and closed.
        SessionRatchet::maybe_step_ratchet(&crypto, &mut session, &second_remote, 1, 2000)
            .unwrap();
        let old_chain = session.chain(&first_remote).unwrap();
        assert!(old_chain.is_closed());
        assert!(old_chain.has_message_key(0));
        assert!(old_chain.has_message_key(1));
        assert_eq!(session.old_ratchets().len(), 1);
        assert_eq!(session.old_ratchets()[0].ephemeral_key, first_remote);

        // Nothing was sent on the previous sending chain.
        assert_eq!(session.current_ratchet().previous_counter(), 0);
        assert!(session.chain(&new_ephemeral).is_none());
    }

    #[test]
    fn message_keys() {
        let crypto = Crypto::from_seed([1; 32]);
        let message_key = Secret::from_bytes(crypto.random_array().unwrap());

        let keys_1 = SessionRatchet::derive_message_keys(&crypto, &message_key).unwrap();
        let keys_2 = SessionRatchet::derive_message_keys(&crypto, &message_key).unwrap();
        assert_eq!(keys_1.cipher_key, keys_2.cipher_key);
        assert_eq!(keys_1.mac_key, keys_2.mac_key);
        assert_eq!(keys_1.iv, keys_2.iv);
        assert_ne!(keys_1.cipher_key.as_bytes(), keys_1.mac_key.as_bytes());
    }
}
