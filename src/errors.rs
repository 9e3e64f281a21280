use std::io;

use thiserror::Error;

use crate::torrent::InfoHash;

/// The result type used throughout the crate for fallible operations outside of
/// the tracker subsystem (see [`crate::tracker::errors::TrackerError`] for that).
pub type Result<T> = std::result::Result<T, GhostSeedError>;

/// Top-level error type aggregating every failure mode a running instance can
/// encounter, from configuration loading to torrent parsing to shutdown handling.
#[derive(Debug, Error)]
pub enum GhostSeedError {
    #[error("configuration is invalid, {0}")]
    ConfigInvalid(String),
    #[error("failed to read configuration, {0}")]
    ConfigIo(String),
    #[error("info hash is invalid, {0}")]
    InvalidInfoHash(String),
    #[error("failed to parse torrent meta-info, {0}")]
    TorrentParseError(String),
    #[error("torrent {0} was not found")]
    TorrentNotFound(InfoHash),
    #[error("no more torrents are available in the pool")]
    NoMoreTorrentsAvailable,
    #[error("a shutdown wait was interrupted, {0}")]
    ShutdownInterrupted(String),
    #[error("an io error occurred, {0}")]
    Io(String),
}

impl PartialEq for GhostSeedError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ConfigInvalid(_), Self::ConfigInvalid(_)) => true,
            (Self::ConfigIo(_), Self::ConfigIo(_)) => true,
            (Self::InvalidInfoHash(_), Self::InvalidInfoHash(_)) => true,
            (Self::TorrentParseError(_), Self::TorrentParseError(_)) => true,
            (Self::TorrentNotFound(a), Self::TorrentNotFound(b)) => a == b,
            (Self::NoMoreTorrentsAvailable, Self::NoMoreTorrentsAvailable) => true,
            (Self::ShutdownInterrupted(_), Self::ShutdownInterrupted(_)) => true,
            (Self::Io(_), Self::Io(_)) => true,
            _ => false,
        }
    }
}

impl From<io::Error> for GhostSeedError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GhostSeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigInvalid(err.to_string())
    }
}

impl From<serde_bencode::error::Error> for GhostSeedError {
    fn from(err: serde_bencode::error::Error) -> Self {
        Self::TorrentParseError(err.to_string())
    }
}
