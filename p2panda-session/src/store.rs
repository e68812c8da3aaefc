// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory persistence of local keys, remote identities and session records.
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::address::ProtocolAddress;
use crate::crypto::x25519::{KeyPair, PublicKey};
use crate::key_bundle::{PreKey, PreKeyId, SignedPreKey, SignedPreKeyId};
use crate::traits::{Direction, ProtocolStore};

#[derive(Clone, Debug)]
pub struct InnerMemoryStore {
    identity_key_pair: KeyPair,
    registration_id: u32,

    /// Pinned identity keys of remote parties, by name.
    identities: HashMap<String, PublicKey>,

    /// Serialized session records, by address.
    sessions: HashMap<ProtocolAddress, String>,

    pre_keys: HashMap<PreKeyId, KeyPair>,
    signed_pre_keys: HashMap<SignedPreKeyId, KeyPair>,
}

/// In-memory [`ProtocolStore`].
///
/// Cloned stores share the same state. An identity key is trusted if no other key was pinned for
/// the remote party yet, the first key seen for a name is trusted on first use.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<RwLock<InnerMemoryStore>>,
}

impl MemoryStore {
    pub fn new(identity_key_pair: KeyPair, registration_id: u32) -> Self {
        let inner = InnerMemoryStore {
            identity_key_pair,
            registration_id,
            identities: HashMap::new(),
            sessions: HashMap::new(),
            pre_keys: HashMap::new(),
            signed_pre_keys: HashMap::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Obtain a read-lock on the store.
    pub fn read_store(&self) -> RwLockReadGuard<'_, InnerMemoryStore> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Obtain a write-lock on the store.
    pub fn write_store(&self) -> RwLockWriteGuard<'_, InnerMemoryStore> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store_pre_key(&self, pre_key: &PreKey) {
        self.write_store()
            .pre_keys
            .insert(pre_key.key_id(), pre_key.key_pair().clone());
    }

    pub fn store_signed_pre_key(&self, signed_pre_key: &SignedPreKey) {
        self.write_store()
            .signed_pre_keys
            .insert(signed_pre_key.key_id(), signed_pre_key.key_pair().clone());
    }

    pub fn remove_signed_pre_key(&self, id: SignedPreKeyId) {
        self.write_store().signed_pre_keys.remove(&id);
    }

    /// Identity key pinned for the remote party with that name.
    pub fn identity(&self, name: &str) -> Option<PublicKey> {
        self.read_store().identities.get(name).copied()
    }
}

impl ProtocolStore for MemoryStore {
    type Error = Infallible;

    async fn identity_key_pair(&self) -> Result<KeyPair, Self::Error> {
        Ok(self.read_store().identity_key_pair.clone())
    }

    async fn local_registration_id(&self) -> Result<u32, Self::Error> {
        Ok(self.read_store().registration_id)
    }

    async fn is_trusted_identity(
        &self,
        name: &str,
        identity_key: &PublicKey,
        _direction: Direction,
    ) -> Result<bool, Self::Error> {
        Ok(self
            .read_store()
            .identities
            .get(name)
            .is_none_or(|pinned| pinned == identity_key))
    }

    async fn save_identity(
        &self,
        address: &ProtocolAddress,
        identity_key: &PublicKey,
    ) -> Result<(), Self::Error> {
        self.write_store()
            .identities
            .insert(address.name().to_owned(), *identity_key);
        Ok(())
    }

    async fn load_session(&self, address: &ProtocolAddress) -> Result<Option<String>, Self::Error> {
        Ok(self.read_store().sessions.get(address).cloned())
    }

    async fn store_session(
        &self,
        address: &ProtocolAddress,
        record: String,
    ) -> Result<(), Self::Error> {
        self.write_store().sessions.insert(address.clone(), record);
        Ok(())
    }

    async fn load_pre_key(&self, id: PreKeyId) -> Result<Option<KeyPair>, Self::Error> {
        Ok(self.read_store().pre_keys.get(&id).cloned())
    }

    async fn remove_pre_key(&self, id: PreKeyId) -> Result<(), Self::Error> {
        self.write_store().pre_keys.remove(&id);
        Ok(())
    }

    async fn load_signed_pre_key(
        &self,
        id: SignedPreKeyId,
    ) -> Result<Option<KeyPair>, Self::Error> {
        Ok(self.read_store().signed_pre_keys.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use crate::address::ProtocolAddress;
    use crate::crypto::Crypto;
    use crate::key_helper::{generate_pre_key, generate_signed_pre_key};
    use crate::traits::{CryptoProvider, Direction, ProtocolStore};

    use super::MemoryStore;

    #[tokio::test]
    async fn trust_on_first_use() {
        let crypto = Crypto::from_seed([1; 32]);
        let store = MemoryStore::new(crypto.create_key_pair().unwrap(), 1);

        let address = ProtocolAddress::new("panda", 1);
        let identity = *crypto.create_key_pair().unwrap().public_key();
        let other_identity = *crypto.create_key_pair().unwrap().public_key();

        for direction in [Direction::Sending, Direction::Receiving] {
            assert!(store.is_trusted_identity("panda", &identity, direction).await.unwrap());
            assert!(
                store
                    .is_trusted_identity("panda", &other_identity, direction)
                    .await
                    .unwrap()
            );
        }

        store.save_identity(&address, &identity).await.unwrap();
        assert_eq!(store.identity("panda"), Some(identity));

        assert!(
            store
                .is_trusted_identity("panda", &identity, Direction::Sending)
                .await
                .unwrap()
        );
        assert!(
            !store
                .is_trusted_identity("panda", &other_identity, Direction::Receiving)
                .await
                .unwrap()
        );

        // Identities are pinned per name, not per device.
        assert!(
            !store
                .is_trusted_identity("panda", &other_identity, Direction::Sending)
                .await
                .unwrap()
        );
        assert!(
            store
                .is_trusted_identity("penguin", &other_identity, Direction::Sending)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn keys_and_sessions() {
        let crypto = Crypto::from_seed([1; 32]);
        let identity_key_pair = crypto.create_key_pair().unwrap();
        let store = MemoryStore::new(identity_key_pair.clone(), 42);

        assert_eq!(store.identity_key_pair().await.unwrap(), identity_key_pair);
        assert_eq!(store.local_registration_id().await.unwrap(), 42);

        let pre_key = generate_pre_key(3, &crypto).unwrap();
        store.store_pre_key(&pre_key);
        assert_eq!(
            store.load_pre_key(3).await.unwrap().as_ref(),
            Some(pre_key.key_pair())
        );
        store.remove_pre_key(3).await.unwrap();
        assert!(store.load_pre_key(3).await.unwrap().is_none());

        let signed_pre_key = generate_signed_pre_key(&identity_key_pair, 7, &crypto).unwrap();
        store.store_signed_pre_key(&signed_pre_key);
        assert!(store.load_signed_pre_key(7).await.unwrap().is_some());
        store.remove_signed_pre_key(7);
        assert!(store.load_signed_pre_key(7).await.unwrap().is_none());

        // Clones share the same state.
        let address = ProtocolAddress::new("panda", 1);
        let clone = store.clone();
        clone
            .store_session(&address, "record".to_owned())
            .await
            .unwrap();
        assert_eq!(
            store.load_session(&address).await.unwrap().as_deref(),
            Some("record")
        );
        assert!(
            store
                .load_session(&ProtocolAddress::new("panda", 2))
                .await
                .unwrap()
                .is_none()
        );
    }
}
