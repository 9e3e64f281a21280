use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use url::Url;

use crate::errors::{GhostSeedError, Result};
use crate::torrent::InfoHash;

/// A single tracker tier: an ordered list of announce URLs tried in order
/// before the tier itself is considered exhausted (BEP 12).
pub type Tier = Vec<Url>;

/// The tracker tiers of a torrent, ordered as they appeared in the meta-info
/// file's `announce-list`, or a single tier containing `announce` when no
/// `announce-list` was present.
pub type TrackerTiers = Vec<Tier>;

/// A parsed, validated `.torrent` meta-info file.
///
/// Only the fields relevant to emulating a seed are kept: identity (info
/// hash, display name, total size) and the tiered tracker list. No piece
/// layout, file list, or piece hashes are retained since this crate never
/// reads or serves actual piece data.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentMetadata {
    pub info_hash: InfoHash,
    pub name: String,
    pub total_size: u64,
    pub trackers: TrackerTiers,
}

impl TorrentMetadata {
    /// Parse and validate a meta-info file's raw bytes.
    ///
    /// Validates that `piece_length * num_pieces >= total_size` and that
    /// at least one tracker tier is present, and derives the info hash from
    /// the re-encoded `info` dictionary.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: RawMetainfo = serde_bencode::from_bytes(bytes)?;
        // Re-serialize the *exact* struct we deserialized, field for field, so the
        // hashed bytes match the file's own `info` dict rather than some lossy
        // projection of it. `private`/`source`/`name.utf-8`/`meta version` are
        // carried specifically because they are ubiquitous on private-tracker
        // torrents: dropping any of them would re-encode to different bytes and
        // yield the wrong info hash for every such torrent.
        let info_bytes = serde_bencode::to_bytes(&raw.info)
            .map_err(|e| GhostSeedError::TorrentParseError(e.to_string()))?;
        let info_hash = InfoHash::from_info_dict(&info_bytes);

        let total_size = raw.info.total_size();
        let num_pieces = raw.info.pieces.len() / 20;
        let declared_capacity = raw.info.piece_length.saturating_mul(num_pieces as u64);
        if num_pieces == 0 || declared_capacity < total_size {
            return Err(GhostSeedError::TorrentParseError(format!(
                "piece layout ({} pieces x {} bytes = {}) cannot hold the declared size ({})",
                num_pieces, raw.info.piece_length, declared_capacity, total_size
            )));
        }

        let trackers = Self::tiered_trackers(&raw);
        if trackers.is_empty() || trackers.iter().all(|t| t.is_empty()) {
            return Err(GhostSeedError::TorrentParseError(
                "meta-info carries no tracker urls".to_string(),
            ));
        }

        Ok(Self {
            info_hash,
            name: raw.info.name(),
            total_size,
            trackers,
        })
    }

    /// Parse a meta-info file from disk.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    fn tiered_trackers(raw: &RawMetainfo) -> TrackerTiers {
        if let Some(list) = &raw.announce_list {
            list.iter()
                .map(|tier| tier.iter().filter_map(|u| Url::parse(u).ok()).collect())
                .collect()
        } else if let Some(url) = &raw.announce {
            match Url::parse(url) {
                Ok(url) => vec![vec![url]],
                Err(_) => vec![],
            }
        } else {
            vec![]
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMetainfo {
    #[serde(default)]
    announce: Option<String>,
    #[serde(rename = "announce-list", default)]
    announce_list: Option<Vec<Vec<String>>>,
    info: RawInfoDict,
}

/// The `info` sub-dictionary, modeled field-for-field (including the keys
/// this crate never otherwise reads) so re-serializing it for hashing
/// reproduces the torrent's real info hash rather than a lossy projection
/// of it. `private`/`source`/`name.utf-8`/`meta version` are BEP
/// extensions absent from a bare single-file torrent but routine on
/// private-tracker releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawInfoDict {
    name: String,
    #[serde(
        rename = "name.utf-8",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    name_utf8: Option<String>,
    #[serde(rename = "piece length")]
    piece_length: u64,
    pieces: ByteBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    files: Option<Vec<RawFileEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(
        rename = "meta version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    meta_version: Option<u64>,
}

impl RawInfoDict {
    /// The UTF-8 name override takes precedence over the legacy `name` key,
    /// matching the way real clients resolve BEP-unspecified encodings.
    fn name(&self) -> String {
        self.name_utf8.clone().unwrap_or_else(|| self.name.clone())
    }

    fn total_size(&self) -> u64 {
        if let Some(length) = self.length {
            length
        } else {
            self.files
                .as_ref()
                .map(|files| files.iter().map(|f| f.length).sum())
                .unwrap_or(0)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFileEntry {
    length: u64,
    #[serde(default)]
    path: Vec<String>,
}
