// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;

use thiserror::Error;

use crate::address::ProtocolAddress;
use crate::crypto::CryptoError;
use crate::crypto::hmac::MacError;
use crate::crypto::x25519::PublicKey;
use crate::key_bundle::{KeyBundleError, SignedPreKeyId};
use crate::message::MessageError;
use crate::session::{RatchetError, RecordError};

#[derive(Debug, Error)]
pub enum SessionError {
    /// Pinned identity of the remote party differs from the one used by the session or bundle.
    #[error("Identity key changed")]
    IdentityKeyChanged(PublicKey),

    /// Identity key of an incoming handshake is not trusted.
    #[error("Unknown identity key")]
    UnknownIdentityKey(PublicKey),

    #[error("incompatible version number {0:#04x}")]
    IncompatibleVersion(u8),

    #[error("bad mac")]
    BadMac,

    /// The message key for this counter was used already or never derived. Decryption must not
    /// be retried with other sessions.
    #[error("key used already or never filled for counter {0}")]
    MessageCounter(u32),

    #[error("over {0} messages into the future")]
    TooFarIntoFuture(u32),

    #[error("chain closed")]
    ChainClosed,

    #[error("tried to encrypt on a receiving chain")]
    EncryptOnReceivingChain,

    #[error("tried to decrypt on a sending chain")]
    DecryptOnSendingChain,

    #[error("no chain for ephemeral key {0}")]
    MissingChain(PublicKey),

    #[error("datastore inconsistency: multiple open sessions")]
    MultipleOpenSessions,

    #[error("no record for device {0}")]
    NoRecord(ProtocolAddress),

    #[error("no session for device {0}")]
    NoSession(ProtocolAddress),

    #[error("missing signed pre-key {0:?} for pre-key whisper message")]
    MissingSignedPreKey(Option<SignedPreKeyId>),

    #[error("no registration id in pre-key whisper message")]
    NoRegistrationId,

    #[error(transparent)]
    Message(MessageError),

    #[error(transparent)]
    Record(RecordError),

    #[error(transparent)]
    KeyBundle(#[from] KeyBundleError),

    #[error(transparent)]
    Crypto(CryptoError),

    #[error("store error: {0}")]
    Store(Box<dyn Error + Send + Sync>),
}

impl SessionError {
    pub(crate) fn store<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Store(Box::new(err))
    }

    /// Returns `true` if a message key was used already, for example because the same message
    /// was delivered twice.
    pub fn is_message_counter(&self) -> bool {
        matches!(self, Self::MessageCounter(_))
    }
}

impl From<MessageError> for SessionError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::IncompatibleVersion(version) => Self::IncompatibleVersion(version),
            err => Self::Message(err),
        }
    }
}

impl From<RatchetError> for SessionError {
    fn from(err: RatchetError) -> Self {
        match err {
            RatchetError::TooFarIntoFuture(max) => Self::TooFarIntoFuture(max),
            RatchetError::ChainClosed => Self::ChainClosed,
            RatchetError::Crypto(err) => err.into(),
        }
    }
}

impl From<RecordError> for SessionError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::MultipleOpenSessions => Self::MultipleOpenSessions,
            err => Self::Record(err),
        }
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Mac(MacError::BadMac) => Self::BadMac,
            err => Self::Crypto(err),
        }
    }
}
