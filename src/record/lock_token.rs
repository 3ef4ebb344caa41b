//! Lock token decoding for both persisted shapes.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredToken {
    Text(String),
    Bytes([u8; 16]),
}

pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let token = match Option::<StoredToken>::deserialize(deserializer)? {
        None => None,
        Some(StoredToken::Text(text)) => Some(Uuid::parse_str(&text).map_err(de::Error::custom)?),
        Some(StoredToken::Bytes(bytes)) => Some(Uuid::from_bytes(bytes)),
    };
    Ok(token.filter(|token| !token.is_nil()))
}
