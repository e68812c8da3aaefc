// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing::{debug, warn};

use crate::address::ProtocolAddress;
use crate::config::SessionConfig;
use crate::crypto::Crypto;
use crate::crypto::x25519::PublicKey;
use crate::error::SessionError;
use crate::message::{
    Ciphertext, CiphertextType, MAC_SIZE, PreKeyWhisperMessage, VERSION_BYTE, WhisperMessage,
};
use crate::session::builder::{load_record, process_v3};
use crate::session::lock::SessionLock;
use crate::session::ratchet::SessionRatchet;
use crate::session::record::{ChainType, SessionRecord, SessionState};
use crate::traits::{CryptoProvider, Direction, ProtocolStore};

/// Encrypts and decrypts messages exchanged with one remote device.
///
/// Every operation loads the session record from the store, works on it and writes it back while
/// holding the lock for the remote address.
#[derive(Debug)]
pub struct SessionCipher<S, P = Crypto> {
    store: S,
    address: ProtocolAddress,
    provider: P,
    lock: SessionLock,
    config: SessionConfig,
}

impl<S> SessionCipher<S, Crypto>
where
    S: ProtocolStore,
{
    pub fn new(store: S, address: ProtocolAddress) -> Self {
        Self::with_provider(store, address, Crypto::default())
    }
}

impl<S, P> SessionCipher<S, P>
where
    S: ProtocolStore,
    P: CryptoProvider,
{
    pub fn with_provider(store: S, address: ProtocolAddress, provider: P) -> Self {
        Self {
            store,
            address,
            provider,
            lock: SessionLock::global(),
            config: SessionConfig::default(),
        }
    }

    /// Uses another lock than the process-wide one.
    ///
    /// All builders and ciphers working on the same store need to share the lock.
    pub fn with_lock(mut self, lock: SessionLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn address(&self) -> &ProtocolAddress {
        &self.address
    }

    /// Encrypts a message with the next key of the sending chain of the open session.
    ///
    /// As long as the remote party did not answer, the message also carries the handshake and
    /// is of type [`CiphertextType::PreKeyWhisper`].
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<Ciphertext, SessionError> {
        let _guard = self.lock.acquire(&self.address.to_string()).await;

        let our_identity = self
            .store
            .identity_key_pair()
            .await
            .map_err(SessionError::store)?;
        let our_registration_id = self
            .store
            .local_registration_id()
            .await
            .map_err(SessionError::store)?;
        let mut record = self
            .load_record()
            .await?
            .ok_or_else(|| SessionError::NoRecord(self.address.clone()))?;

        let mut session = record
            .get_open_session()?
            .cloned()
            .ok_or_else(|| SessionError::NoSession(self.address.clone()))?;

        let ephemeral_key = *session.current_ratchet.ephemeral_public_key();
        let chain = session
            .chain_mut(&ephemeral_key)
            .ok_or(SessionError::MissingChain(ephemeral_key))?;
        if chain.chain_type() == ChainType::Receiving {
            return Err(SessionError::EncryptOnReceivingChain);
        }

        let counter = u32::try_from(chain.counter() + 1).unwrap_or_default();
        SessionRatchet::fill_message_keys(
            &self.provider,
            chain,
            counter,
            self.config.max_message_keys_skip,
        )?;
        let message_key = chain
            .message_keys
            .remove(&counter)
            .ok_or(SessionError::MessageCounter(counter))?;
        let keys = SessionRatchet::derive_message_keys(&self.provider, &message_key)?;

        let message = WhisperMessage {
            ephemeral_key,
            counter,
            previous_counter: session.current_ratchet.previous_counter(),
            ciphertext: self.provider.encrypt(
                keys.cipher_key.as_bytes(),
                plaintext,
                &keys.iv,
            )?,
        };
        let body = message.encode_body();

        let remote_identity = *session.index_info.remote_identity_key();
        let mac = self.provider.sign(
            keys.mac_key.as_bytes(),
            &mac_input(our_identity.public_key(), &remote_identity, &body),
        )?;
        let mut truncated_mac = [0; MAC_SIZE];
        truncated_mac.copy_from_slice(&mac[..MAC_SIZE]);
        let whisper_message = WhisperMessage::frame(&body, &truncated_mac);

        // The identity could have changed while we were busy.
        let trusted = self
            .store
            .is_trusted_identity(self.address.name(), &remote_identity, Direction::Sending)
            .await
            .map_err(SessionError::store)?;
        if !trusted {
            return Err(SessionError::IdentityKeyChanged(remote_identity));
        }
        self.store
            .save_identity(&self.address, &remote_identity)
            .await
            .map_err(SessionError::store)?;

        let registration_id = session.registration_id();
        let pending_pre_key = session.pending_pre_key().cloned();

        record.update_session_state(session);
        self.store
            .store_session(&self.address, record.serialize()?)
            .await
            .map_err(SessionError::store)?;

        let ciphertext = match pending_pre_key {
            Some(pending_pre_key) => Ciphertext {
                message_type: CiphertextType::PreKeyWhisper,
                body: PreKeyWhisperMessage {
                    registration_id: Some(our_registration_id),
                    pre_key_id: pending_pre_key.pre_key_id(),
                    signed_pre_key_id: Some(pending_pre_key.signed_key_id()),
                    base_key: *pending_pre_key.base_key(),
                    identity_key: *our_identity.public_key(),
                    message: whisper_message,
                }
                .to_bytes(),
                registration_id,
            },
            None => Ciphertext {
                message_type: CiphertextType::Whisper,
                body: whisper_message,
                registration_id,
            },
        };

        Ok(ciphertext)
    }

    /// Decrypts a message carrying a handshake, establishing a new session if necessary.
    ///
    /// The one-time pre-key used by the remote party is removed from the store after the message
    /// was decrypted.
    pub async fn decrypt_pre_key_whisper_message(
        &self,
        bytes: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let message = PreKeyWhisperMessage::from_bytes(bytes)?;

        let _guard = self.lock.acquire(&self.address.to_string()).await;

        let mut record = match self.load_record().await? {
            Some(record) => record,
            None => {
                if message.registration_id.is_none() {
                    return Err(SessionError::NoRegistrationId);
                }
                SessionRecord::with_config(self.config)
            }
        };

        let pre_key_id = process_v3(
            &self.store,
            &self.provider,
            &self.address,
            &mut record,
            &message,
        )
        .await?;

        let mut session = record
            .get_session_by_base_key(&message.base_key)
            .cloned()
            .ok_or_else(|| SessionError::NoSession(self.address.clone()))?;

        let our_identity = self
            .store
            .identity_key_pair()
            .await
            .map_err(SessionError::store)?;
        let plaintext =
            self.decrypt_with_session(our_identity.public_key(), &message.message, &mut session)?;

        record.update_session_state(session);
        self.store
            .store_session(&self.address, record.serialize()?)
            .await
            .map_err(SessionError::store)?;

        if let Some(pre_key_id) = pre_key_id {
            self.store
                .remove_pre_key(pre_key_id)
                .await
                .map_err(SessionError::store)?;
        }

        Ok(plaintext)
    }

    /// Decrypts a message of an established session.
    ///
    /// All known sessions are tried, starting with the open one and continuing with the most
    /// recently closed ones. A closed session decrypting the message becomes the open session.
    pub async fn decrypt_whisper_message(&self, bytes: &[u8]) -> Result<Vec<u8>, SessionError> {
        let _guard = self.lock.acquire(&self.address.to_string()).await;

        let mut record = self
            .load_record()
            .await?
            .ok_or_else(|| SessionError::NoRecord(self.address.clone()))?;

        let our_identity = self
            .store
            .identity_key_pair()
            .await
            .map_err(SessionError::store)?;

        let (plaintext, session) =
            self.decrypt_with_session_list(our_identity.public_key(), bytes, &record)?;

        let open_base_key = record.get_open_session()?.map(|open| *open.base_key());
        let promote = open_base_key.as_ref() != Some(session.base_key());
        if promote {
            record.archive_current_state()?;
        }

        let remote_identity = *session.index_info.remote_identity_key();
        let trusted = self
            .store
            .is_trusted_identity(self.address.name(), &remote_identity, Direction::Receiving)
            .await
            .map_err(SessionError::store)?;
        if !trusted {
            return Err(SessionError::IdentityKeyChanged(remote_identity));
        }
        self.store
            .save_identity(&self.address, &remote_identity)
            .await
            .map_err(SessionError::store)?;

        if promote {
            record.promote_state(session);
        } else {
            record.update_session_state(session);
        }
        self.store
            .store_session(&self.address, record.serialize()?)
            .await
            .map_err(SessionError::store)?;

        Ok(plaintext)
    }

    /// Returns the registration id of the remote device.
    ///
    /// `None` if there is no record for the device, `Some(None)` if there is no open session or
    /// its registration id is unknown.
    pub async fn get_remote_registration_id(&self) -> Result<Option<Option<u32>>, SessionError> {
        let _guard = self.lock.acquire(&self.address.to_string()).await;

        let Some(record) = self.load_record().await? else {
            return Ok(None);
        };
        Ok(Some(
            record
                .get_open_session()?
                .and_then(SessionState::registration_id),
        ))
    }

    pub async fn has_open_session(&self) -> Result<bool, SessionError> {
        let _guard = self.lock.acquire(&self.address.to_string()).await;

        match self.load_record().await? {
            Some(record) => Ok(record.have_open_session()?),
            None => Ok(false),
        }
    }

    /// Archives the open session, new messages can only be sent after establishing a new one.
    pub async fn close_open_session_for_device(&self) -> Result<(), SessionError> {
        let _guard = self.lock.acquire(&self.address.to_string()).await;

        let Some(mut record) = self.load_record().await? else {
            return Ok(());
        };
        if record.get_open_session()?.is_none() {
            return Ok(());
        }

        record.archive_current_state()?;
        self.store
            .store_session(&self.address, record.serialize()?)
            .await
            .map_err(SessionError::store)?;
        Ok(())
    }

    pub async fn delete_all_sessions_for_device(&self) -> Result<(), SessionError> {
        let _guard = self.lock.acquire(&self.address.to_string()).await;

        let Some(mut record) = self.load_record().await? else {
            return Ok(());
        };

        record.delete_all_sessions();
        self.store
            .store_session(&self.address, record.serialize()?)
            .await
            .map_err(SessionError::store)?;
        Ok(())
    }

    async fn load_record(&self) -> Result<Option<SessionRecord>, SessionError> {
        load_record(&self.store, &self.address, self.config).await
    }

    /// Tries to decrypt with every session, the open session first. Each attempt works on a copy
    /// of the session, the copy which decrypted the message is returned.
    fn decrypt_with_session_list(
        &self,
        our_identity: &PublicKey,
        bytes: &[u8],
        record: &SessionRecord,
    ) -> Result<(Vec<u8>, SessionState), SessionError> {
        let mut first_error = None;

        for session in record.get_sessions().into_iter().rev() {
            let mut session = session.clone();
            match self.decrypt_with_session(our_identity, bytes, &mut session) {
                Ok(plaintext) => return Ok((plaintext, session)),
                Err(err) if err.is_message_counter() => return Err(err),
                Err(err) => {
                    debug!(base_key = %session.base_key(), "failed decrypting with session: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => {
                warn!(address = %self.address, "failed to decrypt message with any known session");
                Err(err)
            }
            None => Err(SessionError::NoSession(self.address.clone())),
        }
    }

    fn decrypt_with_session(
        &self,
        our_identity: &PublicKey,
        bytes: &[u8],
        session: &mut SessionState,
    ) -> Result<Vec<u8>, SessionError> {
        let (body, mac) = WhisperMessage::unframe(bytes)?;
        let message = WhisperMessage::decode_body(body)?;

        if !session.is_open() {
            debug!(address = %self.address, "decrypting message for closed session");
        }

        SessionRatchet::maybe_step_ratchet(
            &self.provider,
            session,
            &message.ephemeral_key,
            message.previous_counter,
            self.config.max_message_keys_skip,
        )?;

        let chain = session
            .chain_mut(&message.ephemeral_key)
            .ok_or(SessionError::MissingChain(message.ephemeral_key))?;
        if chain.chain_type() == ChainType::Sending {
            return Err(SessionError::DecryptOnSendingChain);
        }

        SessionRatchet::fill_message_keys(
            &self.provider,
            chain,
            message.counter,
            self.config.max_message_keys_skip,
        )?;
        let message_key = chain
            .message_keys
            .remove(&message.counter)
            .ok_or(SessionError::MessageCounter(message.counter))?;
        let keys = SessionRatchet::derive_message_keys(&self.provider, &message_key)?;

        let input = mac_input(session.index_info.remote_identity_key(), our_identity, body);
        self.provider
            .verify_mac(&input, keys.mac_key.as_bytes(), mac, MAC_SIZE)?;

        let plaintext =
            self.provider
                .decrypt(keys.cipher_key.as_bytes(), &message.ciphertext, &keys.iv)?;

        session.pending_pre_key = None;

        Ok(plaintext)
    }
}

/// Input of the message MAC, sender and receiver identity are followed by the version byte and the
/// encoded message.
fn mac_input(sender_identity: &PublicKey, receiver_identity: &PublicKey, body: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(sender_identity.as_bytes().len() * 2 + 1 + body.len());
    input.extend_from_slice(sender_identity.as_bytes());
    input.extend_from_slice(receiver_identity.as_bytes());
    input.push(VERSION_BYTE);
    input.extend_from_slice(body);
    input
}
