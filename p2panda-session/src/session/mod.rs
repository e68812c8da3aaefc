// SPDX-License-Identifier: MIT OR Apache-2.0

//! Double-ratchet sessions between two devices.
//!
//! A [`SessionBuilder`] establishes a session from the published key bundle of a remote device,
//! a [`SessionCipher`] encrypts and decrypts messages with it. Both persist their state as a
//! [`SessionRecord`] in the [`ProtocolStore`](crate::traits::ProtocolStore), all operations for
//! the same remote address are serialized by a [`SessionLock`].
mod builder;
mod cipher;
mod lock;
mod ratchet;
mod record;

pub use builder::{SessionBuilder, SessionRole, init_session};
pub use cipher::SessionCipher;
pub use lock::{SessionLock, SessionLockGuard};
pub use ratchet::{MessageKeys, RatchetError, SessionRatchet};
pub use record::{
    BaseKeyType, Chain, ChainKey, ChainType, IndexInfo, OldRatchet, PendingPreKey, Ratchet,
    RecordError, SESSION_RECORD_VERSION, SessionRecord, SessionState, Timestamp,
};
