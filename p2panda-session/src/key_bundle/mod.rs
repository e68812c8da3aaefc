// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pre-keys and published key bundles used to establish sessions.
#[allow(clippy::module_inception)]
mod key_bundle;
mod pre_key;

pub use key_bundle::{KeyBundleError, PreKeyBundle};
pub use pre_key::{
    PreKey, PreKeyId, PublicPreKey, PublicSignedPreKey, SignedPreKey, SignedPreKeyId,
};
