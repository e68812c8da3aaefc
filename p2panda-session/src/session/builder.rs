// SPDX-License-Identifier: MIT OR Apache-2.0

//! X3DH-style key agreement establishing new sessions.
//!
//! The initiator processes the published key bundle of the remote device and can encrypt right
//! away. Its first messages carry the handshake until the responder answers, the responder
//! processes the handshake when decrypting the first of them.
//!
//! <https://signal.org/docs/specifications/x3dh/>
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::address::ProtocolAddress;
use crate::config::SessionConfig;
use crate::crypto::Crypto;
use crate::crypto::Secret;
use crate::crypto::x25519::{KeyPair, PublicKey};
use crate::error::SessionError;
use crate::key_bundle::{PreKeyBundle, PreKeyId};
use crate::message::PreKeyWhisperMessage;
use crate::session::lock::SessionLock;
use crate::session::ratchet::SessionRatchet;
use crate::session::record::{
    BaseKeyType, IndexInfo, PendingPreKey, Ratchet, SessionRecord, SessionState,
};
use crate::traits::{CryptoProvider, Direction, ProtocolStore};

const KDF_INFO: &[u8] = b"WhisperText";

/// Role we take in the key agreement, together with the keys each role contributes.
#[derive(Debug)]
pub enum SessionRole<'a> {
    /// We process the key bundle of the remote party.
    Initiator {
        base_key: &'a KeyPair,
        their_signed_pre_key: &'a PublicKey,
        their_one_time_pre_key: Option<&'a PublicKey>,
    },

    /// We process the handshake of the remote party.
    Responder {
        our_signed_pre_key: &'a KeyPair,
        our_one_time_pre_key: Option<&'a KeyPair>,
        their_base_key: &'a PublicKey,
    },
}

/// Establishes sessions with one remote device.
#[derive(Debug)]
pub struct SessionBuilder<S, P = Crypto> {
    store: S,
    address: ProtocolAddress,
    provider: P,
    lock: SessionLock,
    config: SessionConfig,
}

impl<S> SessionBuilder<S, Crypto>
where
    S: ProtocolStore,
{
    pub fn new(store: S, address: ProtocolAddress) -> Self {
        Self::with_provider(store, address, Crypto::default())
    }
}

impl<S, P> SessionBuilder<S, P>
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

    /// Establishes a new open session from the key bundle of the remote device.
    ///
    /// A previously open session gets archived. Messages encrypted with the new session carry the
    /// handshake until the remote party answers.
    pub async fn process_pre_key(&self, bundle: &PreKeyBundle) -> Result<(), SessionError> {
        self.lock
            .run_exclusive(&self.address.to_string(), self.establish(bundle))
            .await
    }

    async fn establish(&self, bundle: &PreKeyBundle) -> Result<(), SessionError> {
        let trusted = self
            .store
            .is_trusted_identity(
                self.address.name(),
                bundle.identity_key(),
                Direction::Sending,
            )
            .await
            .map_err(SessionError::store)?;
        if !trusted {
            return Err(SessionError::IdentityKeyChanged(*bundle.identity_key()));
        }

        bundle.verify(&self.provider)?;

        let our_identity = self
            .store
            .identity_key_pair()
            .await
            .map_err(SessionError::store)?;
        let base_key = self.provider.create_key_pair()?;
        let signed_pre_key = bundle.signed_pre_key();
        let one_time_pre_key = bundle.pre_key();

        let mut session = init_session(
            &self.provider,
            SessionRole::Initiator {
                base_key: &base_key,
                their_signed_pre_key: &signed_pre_key.public_key,
                their_one_time_pre_key: one_time_pre_key.map(|pre_key| &pre_key.public_key),
            },
            &our_identity,
            bundle.identity_key(),
            Some(bundle.registration_id()),
        )?;
        session.pending_pre_key = Some(PendingPreKey {
            signed_key_id: signed_pre_key.key_id,
            base_key: *base_key.public_key(),
            pre_key_id: one_time_pre_key.map(|pre_key| pre_key.key_id),
        });

        let mut record = load_record(&self.store, &self.address, self.config)
            .await?
            .unwrap_or_else(|| SessionRecord::with_config(self.config));
        record.archive_current_state()?;
        record.update_session_state(session);

        self.store
            .store_session(&self.address, record.serialize()?)
            .await
            .map_err(SessionError::store)?;
        self.store
            .save_identity(&self.address, bundle.identity_key())
            .await
            .map_err(SessionError::store)?;

        Ok(())
    }

    /// Establishes a session from the handshake of an incoming pre-key whisper message.
    ///
    /// Needs to be called while holding the lock for this address, the record is not persisted.
    /// Returns the id of the one-time pre-key used by the remote party which needs to be removed
    /// after the message was decrypted successfully.
    pub async fn process_v3(
        &self,
        record: &mut SessionRecord,
        message: &PreKeyWhisperMessage,
    ) -> Result<Option<PreKeyId>, SessionError> {
        process_v3(&self.store, &self.provider, &self.address, record, message).await
    }
}

pub(crate) async fn load_record<S: ProtocolStore>(
    store: &S,
    address: &ProtocolAddress,
    config: SessionConfig,
) -> Result<Option<SessionRecord>, SessionError> {
    let Some(serialized) = store
        .load_session(address)
        .await
        .map_err(SessionError::store)?
    else {
        return Ok(None);
    };
    Ok(Some(SessionRecord::deserialize_with_config(
        &serialized,
        config,
    )?))
}

pub(crate) async fn process_v3<S, P>(
    store: &S,
    provider: &P,
    address: &ProtocolAddress,
    record: &mut SessionRecord,
    message: &PreKeyWhisperMessage,
) -> Result<Option<PreKeyId>, SessionError>
where
    S: ProtocolStore,
    P: CryptoProvider,
{
    let trusted = store
        .is_trusted_identity(address.name(), &message.identity_key, Direction::Receiving)
        .await
        .map_err(SessionError::store)?;
    if !trusted {
        return Err(SessionError::UnknownIdentityKey(message.identity_key));
    }

    let one_time_pre_key = match message.pre_key_id {
        Some(id) => store.load_pre_key(id).await.map_err(SessionError::store)?,
        None => None,
    };
    let signed_pre_key = match message.signed_pre_key_id {
        Some(id) => store
            .load_signed_pre_key(id)
            .await
            .map_err(SessionError::store)?,
        None => None,
    };

    if record.get_session_by_base_key(&message.base_key).is_some() {
        debug!(%address, "duplicate pre-key whisper message for session");
        return Ok(None);
    }

    let has_open_session = record.get_open_session()?.is_some();

    let Some(signed_pre_key) = signed_pre_key else {
        // The signed pre-key could have been rotated already. The open session might still be
        // the right one, otherwise decryption fails later.
        if has_open_session {
            return Ok(None);
        }
        return Err(SessionError::MissingSignedPreKey(message.signed_pre_key_id));
    };

    if has_open_session {
        record.archive_current_state()?;
    }

    if let (Some(id), None) = (message.pre_key_id, &one_time_pre_key) {
        warn!(%address, pre_key_id = id, "invalid pre-key id");
    }

    let our_identity = store
        .identity_key_pair()
        .await
        .map_err(SessionError::store)?;

    let session = init_session(
        provider,
        SessionRole::Responder {
            our_signed_pre_key: &signed_pre_key,
            our_one_time_pre_key: one_time_pre_key.as_ref(),
            their_base_key: &message.base_key,
        },
        &our_identity,
        &message.identity_key,
        message.registration_id,
    )?;
    record.update_session_state(session);

    store
        .save_identity(address, &message.identity_key)
        .await
        .map_err(SessionError::store)?;

    Ok(message.pre_key_id)
}

/// Derives the initial root key from the key agreement and sets up a new open session.
///
/// ```text
/// secret = 0xFF * 32
///       || DH(their signed pre-key, our identity)   (responder: DH(their identity, our signed))
///       || DH(their identity, our signed)           (responder: DH(their signed, our identity))
///       || DH(their signed pre-key, our signed)
///       || DH(their one-time pre-key, our base key) (only if a one-time pre-key was used)
/// ```
///
/// The initiator uses its base key in place of "our signed" key, the responder uses the
/// initiator's base key in place of "their signed" pre-key. Both sides end up with the same
/// secret.
pub fn init_session<P: CryptoProvider>(
    provider: &P,
    role: SessionRole<'_>,
    our_identity: &KeyPair,
    their_identity: &PublicKey,
    registration_id: Option<u32>,
) -> Result<SessionState, SessionError> {
    let (our_signed, their_signed, ephemeral_pair) = match &role {
        SessionRole::Initiator {
            base_key,
            their_signed_pre_key,
            their_one_time_pre_key,
        } => (
            *base_key,
            *their_signed_pre_key,
            their_one_time_pre_key.map(|their_one_time| (*base_key, their_one_time)),
        ),
        SessionRole::Responder {
            our_signed_pre_key,
            our_one_time_pre_key,
            their_base_key,
        } => (
            *our_signed_pre_key,
            *their_base_key,
            our_one_time_pre_key.map(|our_one_time| (our_one_time, *their_base_key)),
        ),
    };
    let is_initiator = matches!(role, SessionRole::Initiator { .. });

    let mut secret = Zeroizing::new(Vec::with_capacity(32 * 5));
    secret.extend_from_slice(&[0xFF; 32]);

    let dh1 = provider.calculate_agreement(their_signed, our_identity.secret_key())?;
    let dh2 = provider.calculate_agreement(their_identity, our_signed.secret_key())?;
    let dh3 = provider.calculate_agreement(their_signed, our_signed.secret_key())?;

    if is_initiator {
        secret.extend_from_slice(&dh1);
        secret.extend_from_slice(&dh2);
    } else {
        secret.extend_from_slice(&dh2);
        secret.extend_from_slice(&dh1);
    }
    secret.extend_from_slice(&dh3);

    if let Some((our_ephemeral, their_ephemeral)) = ephemeral_pair {
        let dh4 = provider.calculate_agreement(their_ephemeral, our_ephemeral.secret_key())?;
        secret.extend_from_slice(&dh4);
    }

    let [root_key] = provider.hkdf::<1>(&secret, &[0; 32], KDF_INFO)?;

    let (base_key, base_key_type) = if is_initiator {
        (*our_signed.public_key(), BaseKeyType::Ours)
    } else {
        (*their_signed, BaseKeyType::Theirs)
    };

    let mut session = SessionState::new(
        registration_id,
        Ratchet {
            root_key: Secret::from_bytes(root_key),
            ephemeral_key_pair: our_signed.clone(),
            last_remote_ephemeral_key: *their_signed,
            previous_counter: 0,
        },
        IndexInfo {
            remote_identity_key: *their_identity,
            base_key,
            base_key_type,
            closed: None,
        },
    );

    if is_initiator {
        // Fresh sending key, the base key is only used for the key agreement.
        session.current_ratchet.ephemeral_key_pair = provider.create_key_pair()?;
        SessionRatchet::calculate_ratchet(provider, &mut session, their_signed, true)?;
    }

    Ok(session)
}
