// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Serialize;
use serde::de::Deserialize;
use serde_bytes::{ByteBuf as SerdeByteBuf, Bytes as SerdeBytes};

/// Keys and signatures are hex strings in JSON session records and raw bytes in binary formats.
pub fn serialize_hex<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if serializer.is_human_readable() {
        hex::serde::serialize(value, serializer)
    } else {
        SerdeBytes::new(value).serialize(serializer)
    }
}

pub fn deserialize_hex<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        hex::serde::deserialize(deserializer)
    } else {
        let bytes = <SerdeByteBuf>::deserialize(deserializer)?;
        Ok(bytes.into_vec())
    }
}
