// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire formats of the two message types exchanged between parties.
//!
//! Both messages are prefixed with a single version byte, holding the version of the sender in
//! the high nibble and the lowest version it supports in the low nibble:
//!
//! ```text
//! Whisper message:         0x33 || protobuf(WhisperMessage) || 8-byte truncated MAC
//! Pre-key whisper message: 0x33 || protobuf(PreKeyWhisperMessage)
//! ```
//!
//! The inner `message` of a pre-key whisper message is a complete whisper message including its
//! own version byte and MAC.
use prost::Message;
use thiserror::Error;

use crate::crypto::x25519::{PublicKey, X25519Error};
use crate::key_bundle::{PreKeyId, SignedPreKeyId};

/// Protocol version spoken by this implementation.
pub const CURRENT_VERSION: u8 = 3;

/// Version byte prefixed to every message we create.
pub const VERSION_BYTE: u8 = (CURRENT_VERSION << 4) | CURRENT_VERSION;

/// Size of the truncated MAC appended to whisper messages.
pub const MAC_SIZE: usize = 8;

/// Protobuf encodings.
pub mod proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct WhisperMessage {
        #[prost(bytes = "vec", optional, tag = "1")]
        pub ephemeral_key: Option<Vec<u8>>,
        #[prost(uint32, optional, tag = "2")]
        pub counter: Option<u32>,
        #[prost(uint32, optional, tag = "3")]
        pub previous_counter: Option<u32>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub ciphertext: Option<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PreKeyWhisperMessage {
        #[prost(uint32, optional, tag = "1")]
        pub pre_key_id: Option<u32>,
        #[prost(bytes = "vec", optional, tag = "2")]
        pub base_key: Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub identity_key: Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub message: Option<Vec<u8>>,
        #[prost(uint32, optional, tag = "5")]
        pub registration_id: Option<u32>,
        #[prost(uint32, optional, tag = "6")]
        pub signed_pre_key_id: Option<u32>,
    }
}

/// Rejects version bytes of senders which are too new for us or which do not support our
/// version anymore.
pub fn check_version(version: u8) -> Result<(), MessageError> {
    if (version & 0x0f) > CURRENT_VERSION || (version >> 4) < CURRENT_VERSION {
        return Err(MessageError::IncompatibleVersion(version));
    }
    Ok(())
}

/// Message of an established session, encrypted with a key of the sender's current chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhisperMessage {
    pub ephemeral_key: PublicKey,
    pub counter: u32,
    pub previous_counter: u32,
    pub ciphertext: Vec<u8>,
}

impl WhisperMessage {
    /// Protobuf encoding of the message, this is the part authenticated by the MAC.
    pub fn encode_body(&self) -> Vec<u8> {
        proto::WhisperMessage {
            ephemeral_key: Some(self.ephemeral_key.to_bytes().to_vec()),
            counter: Some(self.counter),
            previous_counter: Some(self.previous_counter),
            ciphertext: Some(self.ciphertext.clone()),
        }
        .encode_to_vec()
    }

    pub fn decode_body(body: &[u8]) -> Result<Self, MessageError> {
        let message = proto::WhisperMessage::decode(body)?;
        let ephemeral_key = message
            .ephemeral_key
            .ok_or(MessageError::MissingField("ephemeralKey"))?;
        Ok(Self {
            ephemeral_key: PublicKey::try_from(ephemeral_key.as_slice())?,
            counter: message.counter.unwrap_or_default(),
            previous_counter: message.previous_counter.unwrap_or_default(),
            ciphertext: message
                .ciphertext
                .ok_or(MessageError::MissingField("ciphertext"))?,
        })
    }

    /// Frames an encoded body and its MAC into the wire format.
    pub fn frame(body: &[u8], mac: &[u8; MAC_SIZE]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + body.len() + MAC_SIZE);
        bytes.push(VERSION_BYTE);
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(mac);
        bytes
    }

    /// Checks the version byte and splits the wire format into encoded body and MAC.
    pub fn unframe(bytes: &[u8]) -> Result<(&[u8], &[u8]), MessageError> {
        let (version, rest) = bytes
            .split_first()
            .ok_or(MessageError::TooShort(bytes.len()))?;
        check_version(*version)?;
        if rest.len() < MAC_SIZE {
            return Err(MessageError::TooShort(bytes.len()));
        }
        Ok(rest.split_at(rest.len() - MAC_SIZE))
    }
}

/// Message carrying the key-agreement handshake along with the first whisper message of a new
/// session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeyWhisperMessage {
    pub registration_id: Option<u32>,
    pub pre_key_id: Option<PreKeyId>,
    pub signed_pre_key_id: Option<SignedPreKeyId>,
    pub base_key: PublicKey,
    pub identity_key: PublicKey,
    pub message: Vec<u8>,
}

impl PreKeyWhisperMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = proto::PreKeyWhisperMessage {
            pre_key_id: self.pre_key_id,
            base_key: Some(self.base_key.to_bytes().to_vec()),
            identity_key: Some(self.identity_key.to_bytes().to_vec()),
            message: Some(self.message.clone()),
            registration_id: self.registration_id,
            signed_pre_key_id: self.signed_pre_key_id,
        }
        .encode_to_vec();

        let mut bytes = Vec::with_capacity(1 + body.len());
        bytes.push(VERSION_BYTE);
        bytes.extend_from_slice(&body);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let (version, body) = bytes
            .split_first()
            .ok_or(MessageError::TooShort(bytes.len()))?;
        check_version(*version)?;

        let message = proto::PreKeyWhisperMessage::decode(body)?;
        let base_key = message
            .base_key
            .ok_or(MessageError::MissingField("baseKey"))?;
        let identity_key = message
            .identity_key
            .ok_or(MessageError::MissingField("identityKey"))?;

        Ok(Self {
            registration_id: message.registration_id,
            pre_key_id: message.pre_key_id,
            signed_pre_key_id: message.signed_pre_key_id,
            base_key: PublicKey::try_from(base_key.as_slice())?,
            identity_key: PublicKey::try_from(identity_key.as_slice())?,
            message: message.message.ok_or(MessageError::MissingField("message"))?,
        })
    }
}

/// Type of an encrypted message, needed by the receiver to pick the matching decrypt method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CiphertextType {
    Whisper,
    PreKeyWhisper,
}

impl CiphertextType {
    pub fn as_u8(&self) -> u8 {
        match self {
            CiphertextType::Whisper => 1,
            CiphertextType::PreKeyWhisper => 3,
        }
    }
}

/// Result of encrypting a message towards a remote device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    pub message_type: CiphertextType,
    pub body: Vec<u8>,

    /// Registration id of the remote device the session was established with.
    pub registration_id: Option<u32>,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("incompatible version number {0:#04x}")]
    IncompatibleVersion(u8),

    #[error("message too short ({0} bytes)")]
    TooShort(usize),

    #[error("missing field '{0}' in message")]
    MissingField(&'static str),

    #[error(transparent)]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    InvalidKey(#[from] X25519Error),
}
