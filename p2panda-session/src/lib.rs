// SPDX-License-Identifier: MIT OR Apache-2.0

//! `p2panda-session` provides asynchronous, end-to-end encrypted sessions between two devices.
//!
//! Sessions are established with an X3DH-style key agreement against a published
//! [`PreKeyBundle`](key_bundle::PreKeyBundle) and afterwards secured by a double ratchet: every
//! message is encrypted with its own key derived from a symmetric-key chain, every answer of the
//! remote party moves the chains forward with a new Diffie-Hellman exchange. Old keys are deleted
//! as soon as they were used, which gives the sessions forward secrecy and lets them recover from
//! compromised keys.
//!
//! Messages arriving out of order or getting lost are handled by keeping the keys of skipped
//! messages around, bounded by [`SessionConfig`](config::SessionConfig).
//!
//! ## Usage
//!
//! All state lives in a [`ProtocolStore`](traits::ProtocolStore). Besides the long-term identity
//! and pre-keys of the local device it holds one [`SessionRecord`](session::SessionRecord) per
//! remote device, which are loaded, modified and written back by every operation.
//! [`MemoryStore`](store::MemoryStore) is an in-memory implementation, applications usually bring
//! their own persistence layer.
//!
//! The initiator processes the key bundle of the remote device with a
//! [`SessionBuilder`](session::SessionBuilder) and can then encrypt messages with a
//! [`SessionCipher`](session::SessionCipher). The first messages carry the handshake until the
//! remote party answered for the first time, the responder establishes its session while
//! decrypting them.
//!
//! Operations for the same remote device are serialized through a
//! [`SessionLock`](session::SessionLock), concurrent calls never use the same message key twice.
pub mod address;
pub mod config;
pub mod crypto;
mod error;
pub mod key_bundle;
pub mod key_helper;
pub mod message;
mod serde;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
pub mod traits;

pub use address::{DeviceId, ProtocolAddress};
pub use error::SessionError;
