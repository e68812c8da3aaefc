// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces for cryptographic primitives and persistence.
mod provider;
mod store;

pub use provider::CryptoProvider;
pub use store::{Direction, ProtocolStore};
