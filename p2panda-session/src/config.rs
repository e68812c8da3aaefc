// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// Maximum number of message keys derived ahead when a message arrives "from the future".
pub const MAX_MESSAGE_KEYS_SKIP: u32 = 2000;

/// Maximum number of closed receiving chains retained per session.
pub const MAX_OLD_RATCHETS: usize = 10;

/// Maximum number of sessions retained per session record.
pub const MAX_ARCHIVED_SESSIONS: usize = 40;

/// Bounds on the state kept per remote device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Largest allowed gap between the last derived message key of a chain and the counter of an
    /// incoming message.
    pub max_message_keys_skip: u32,

    /// Closed receiving chains kept around for late messages, oldest are evicted first.
    pub max_old_ratchets: usize,

    /// Sessions kept in a record, oldest closed sessions are evicted first. The open session is
    /// never evicted.
    pub max_archived_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_keys_skip: MAX_MESSAGE_KEYS_SKIP,
            max_old_ratchets: MAX_OLD_RATCHETS,
            max_archived_sessions: MAX_ARCHIVED_SESSIONS,
        }
    }
}
