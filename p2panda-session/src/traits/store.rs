// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;

use crate::address::ProtocolAddress;
use crate::crypto::x25519::{KeyPair, PublicKey};
use crate::key_bundle::{PreKeyId, SignedPreKeyId};

/// Direction in which an identity key is about to be used.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Sending,
    Receiving,
}

/// Persistence of local keys, pinned remote identities and session records.
///
/// Session records are handed over as opaque serialized strings, keyed by the remote address.
/// The store is the authority over all state, sessions do not cache anything between operations.
pub trait ProtocolStore {
    type Error: Error + Send + Sync + 'static;

    /// Our long-term identity key pair.
    fn identity_key_pair(&self) -> impl Future<Output = Result<KeyPair, Self::Error>>;

    /// Our registration id.
    fn local_registration_id(&self) -> impl Future<Output = Result<u32, Self::Error>>;

    /// Returns `true` if the identity key can be used with the remote party of that name.
    fn is_trusted_identity(
        &self,
        name: &str,
        identity_key: &PublicKey,
        direction: Direction,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Pins the identity key of a remote party.
    fn save_identity(
        &self,
        address: &ProtocolAddress,
        identity_key: &PublicKey,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    fn load_session(
        &self,
        address: &ProtocolAddress,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>>;

    fn store_session(
        &self,
        address: &ProtocolAddress,
        record: String,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    fn load_pre_key(
        &self,
        id: PreKeyId,
    ) -> impl Future<Output = Result<Option<KeyPair>, Self::Error>>;

    /// Removes a consumed one-time pre-key.
    fn remove_pre_key(&self, id: PreKeyId) -> impl Future<Output = Result<(), Self::Error>>;

    fn load_signed_pre_key(
        &self,
        id: SignedPreKeyId,
    ) -> impl Future<Output = Result<Option<KeyPair>, Self::Error>>;
}
