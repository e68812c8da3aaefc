// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::crypto::CryptoError;
use crate::key_bundle::{PreKeyBundle, PreKeyId, SignedPreKeyId};
use crate::key_helper::{
    generate_identity_key_pair, generate_pre_key, generate_registration_id,
    generate_signed_pre_key,
};
use crate::store::MemoryStore;
use crate::traits::{CryptoProvider, ProtocolStore};

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

/// In-memory store with a fresh identity and registration id.
pub fn generate_store<P: CryptoProvider>(provider: &P) -> Result<MemoryStore, CryptoError> {
    let identity_key_pair = generate_identity_key_pair(provider)?;
    let registration_id = generate_registration_id(provider)?;
    Ok(MemoryStore::new(identity_key_pair, registration_id))
}

/// Generates a signed pre-key and optionally a one-time pre-key, persists them in the store and
/// returns the key bundle to be published.
pub async fn generate_pre_key_bundle<P: CryptoProvider>(
    store: &MemoryStore,
    pre_key_id: Option<PreKeyId>,
    signed_pre_key_id: SignedPreKeyId,
    provider: &P,
) -> Result<PreKeyBundle, CryptoError> {
    let Ok(identity_key_pair) = store.identity_key_pair().await;
    let Ok(registration_id) = store.local_registration_id().await;

    let signed_pre_key = generate_signed_pre_key(&identity_key_pair, signed_pre_key_id, provider)?;
    store.store_signed_pre_key(&signed_pre_key);

    let pre_key = match pre_key_id {
        Some(id) => {
            let pre_key = generate_pre_key(id, provider)?;
            store.store_pre_key(&pre_key);
            Some(pre_key.to_public())
        }
        None => None,
    };

    Ok(PreKeyBundle::new(
        *identity_key_pair.public_key(),
        registration_id,
        pre_key,
        signed_pre_key.to_public(),
    ))
}
