use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};

use crate::errors::{GhostSeedError, Result};

/// The raw byte representation of a v1 BitTorrent info hash.
pub type InfoHashBytes = [u8; 20];

/// The unique 20-byte identifier of a torrent, derived from the SHA-1 hash of the
/// bencoded `info` dictionary of its meta-info file.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct InfoHash(InfoHashBytes);

impl InfoHash {
    /// Hash the given bencoded `info` dictionary bytes into an [`InfoHash`].
    pub fn from_info_dict<T: AsRef<[u8]>>(bytes: T) -> Self {
        let digest = Sha1::digest(bytes.as_ref());
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest[..20]);
        Self(hash)
    }

    /// Get the raw 20-byte representation of this info hash.
    pub fn as_bytes(&self) -> &InfoHashBytes {
        &self.0
    }

    /// Try to parse an [`InfoHash`] from raw bytes. The slice must be exactly 20 bytes long.
    pub fn try_from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let bytes = bytes.as_ref();
        if bytes.len() != 20 {
            return Err(GhostSeedError::InvalidInfoHash(format!(
                "expected 20 bytes, got {}",
                bytes.len()
            )));
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(bytes);
        Ok(Self(hash))
    }

    /// Get the info hash as an uppercase hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0).to_uppercase()
    }
}

impl Serialize for InfoHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(InfoHashVisitor)
    }
}

struct InfoHashVisitor;

impl Visitor<'_> for InfoHashVisitor {
    type Value = InfoHash;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a 40-character hex encoded info hash")
    }

    fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        InfoHash::from_str(value).map_err(serde::de::Error::custom)
    }
}

impl Debug for InfoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InfoHash").field(&self.to_hex()).finish()
    }
}

impl Display for InfoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for InfoHash {
    type Err = GhostSeedError;

    /// Parses an [`InfoHash`] from a hex encoded string, optionally prefixed with
    /// `urn:btih:` per the magnet URI convention.
    fn from_str(value: &str) -> Result<Self> {
        let value = value
            .strip_prefix("urn:btih:")
            .or_else(|| value.strip_prefix("URN:BTIH:"))
            .unwrap_or(value);

        if value.len() != 40 {
            return Err(GhostSeedError::InvalidInfoHash(
                "expected a 40-character hex value".to_string(),
            ));
        }

        let bytes = hex::decode(value)
            .map_err(|e| GhostSeedError::InvalidInfoHash(format!("invalid hex, {}", e)))?;
        Self::try_from_bytes(bytes)
    }
}
