use std::fmt::{Debug, Display, Formatter};

use rand::Rng;

/// The raw 20-byte peer-id advertised to trackers and (nominally) other peers.
pub type PeerIdBytes = [u8; 20];

/// A session-unique, client-shaped peer identity.
///
/// Unlike a torrent [`crate::torrent::InfoHash`], a [`PeerId`] is not content-derived:
/// it is generated once per run and reused for every announce, following the
/// convention (e.g. Azureus-style `-XX0000-` prefix) carried by the emulated
/// client's fingerprint file.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PeerId(PeerIdBytes);

impl PeerId {
    /// Generate a new peer-id using the given client prefix (e.g. `-qB4650-`).
    ///
    /// The prefix is copied verbatim into the leading bytes; the remainder is
    /// filled with random ASCII-safe bytes so the full 20-byte identity is unique
    /// per run.
    pub fn generate(prefix: &str) -> Self {
        let mut bytes = [0u8; 20];
        let prefix_bytes = prefix.as_bytes();
        let len = prefix_bytes.len().min(20);
        bytes[..len].copy_from_slice(&prefix_bytes[..len]);

        let mut rng = rand::rng();
        for slot in bytes.iter_mut().skip(len) {
            *slot = rng.random_range(b'0'..=b'9');
        }

        Self(bytes)
    }

    /// Get the raw 20-byte representation of this peer-id.
    pub fn as_bytes(&self) -> &PeerIdBytes {
        &self.0
    }
}

impl Debug for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PeerId").field(&hex::encode(self.0)).finish()
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
