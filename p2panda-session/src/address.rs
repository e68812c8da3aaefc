// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric identifier of one device of a remote party.
pub type DeviceId = u32;

/// Address of a remote device, a party's name together with one of its device ids.
///
/// The string form `<name>.<deviceId>` keys session records in the store and the per-address job
/// queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolAddress {
    name: String,
    device_id: DeviceId,
}

impl ProtocolAddress {
    pub fn new(name: impl Into<String>, device_id: DeviceId) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

impl FromStr for ProtocolAddress {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, device_id) = value
            .rsplit_once('.')
            .ok_or_else(|| AddressError::Invalid(value.to_owned()))?;

        if device_id.is_empty() || !device_id.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(AddressError::Invalid(value.to_owned()));
        }

        let device_id = device_id
            .parse()
            .map_err(|_| AddressError::Invalid(value.to_owned()))?;

        Ok(Self::new(name, device_id))
    }
}

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid protocol address string '{0}'")]
    Invalid(String),
}
