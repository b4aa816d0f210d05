//! Hex encoders for the JSON trace formats.

use serde::{Serialize, Serializer};

pub mod u64 {
    pub mod hex_str {
        use serde::Serializer;

        pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&format!("{value:#x}"))
        }
    }

    pub mod hex_str_opt {
        use serde::Serializer;

        pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(value) => super::hex_str::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }
    }
}

pub mod bytes {
    use serde::Serializer;

    pub fn serialize<S>(value: &::bytes::Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub mod opt {
        use serde::Serializer;

        pub fn serialize<S>(
            value: &Option<::bytes::Bytes>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }
    }
}

/// Byte string that serializes as `0x`-prefixed hex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HexBytes(pub ::bytes::Bytes);

impl Serialize for HexBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes::serialize(&self.0, serializer)
    }
}

impl From<::bytes::Bytes> for HexBytes {
    fn from(value: ::bytes::Bytes) -> Self {
        HexBytes(value)
    }
}
