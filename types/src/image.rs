use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;

/// Encoded image payload (jpeg, png, ...).
///
/// On the wire it travels as a base64 string. A leading data URI header such as
/// `data:image/png;base64,` is accepted and discarded.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EncodedImage(pub Vec<u8>);

impl EncodedImage {
    pub fn from_base64(input: &str) -> Result<Self, base64::DecodeError> {
        let payload = match input.split_once(',') {
            Some((_, data)) => data,
            None => input,
        };
        STANDARD.decode(payload.trim()).map(Self)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodedImage({} bytes)", self.0.len())
    }
}

impl Deref for EncodedImage {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for EncodedImage {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for EncodedImage {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for EncodedImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_base64(&raw).map_err(|e| D::Error::custom(format!("invalid base64 image: {e}")))
    }
}
