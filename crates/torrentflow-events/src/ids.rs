//! Content identifier shared by every layer.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use data_encoding::BASE32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{InfoHashError, InfoHashResult};

/// SHA-1 digest of a transfer's info dictionary.
///
/// Displayed and serialised as 40 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Length of the raw digest in bytes.
    pub const LEN: usize = 20;

    /// Wrap a raw digest.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode either the 40-character hex or the 32-character base32 form.
    ///
    /// # Errors
    ///
    /// Returns [`InfoHashError`] when the length or alphabet is wrong.
    pub fn parse(input: &str) -> InfoHashResult<Self> {
        let trimmed = input.trim();
        let decoded = match trimmed.len() {
            40 => hex::decode(trimmed)
                .map_err(|_| InfoHashError::InvalidEncoding { encoding: "hex" })?,
            32 => BASE32
                .decode(trimmed.to_ascii_uppercase().as_bytes())
                .map_err(|_| InfoHashError::InvalidEncoding { encoding: "base32" })?,
            length => return Err(InfoHashError::InvalidLength { length }),
        };
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|_| InfoHashError::InvalidLength {
                length: trimmed.len(),
            })?;
        Ok(Self(bytes))
    }
}

impl Display for InfoHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_hex())
    }
}

impl FromStr for InfoHash {
    type Err = InfoHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    #[test]
    fn parses_hex_and_renders_lowercase() {
        let hash = InfoHash::parse(&HEX.to_ascii_uppercase()).expect("hex parses");
        assert_eq!(hash.to_string(), HEX);
    }

    #[test]
    fn base32_and_hex_forms_agree() {
        let hash = InfoHash::parse(HEX).expect("hex parses");
        let encoded = BASE32.encode(hash.as_bytes());
        assert_eq!(encoded.len(), 32);
        let from_base32 = InfoHash::parse(&encoded.to_ascii_lowercase()).expect("base32 parses");
        assert_eq!(from_base32, hash);
    }

    #[test]
    fn rejects_wrong_length_and_alphabet() {
        assert_eq!(
            InfoHash::parse("abc"),
            Err(InfoHashError::InvalidLength { length: 3 })
        );
        let bad_hex = "z".repeat(40);
        assert_eq!(
            InfoHash::parse(&bad_hex),
            Err(InfoHashError::InvalidEncoding { encoding: "hex" })
        );
    }

    #[test]
    fn serde_uses_hex_string() {
        let hash = InfoHash::parse(HEX).expect("hex parses");
        let json = serde_json::to_string(&hash).expect("serialise");
        assert_eq!(json, format!("\"{HEX}\""));
        let back: InfoHash = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, hash);
    }
}
