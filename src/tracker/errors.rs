use std::io;

use thiserror::Error;
use url::ParseError;

/// The result type of tracker announce operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Error type for tracker announce transport and protocol failures.
///
/// Connection-level failures and malformed-response failures are kept as
/// separate variants even though the response handler chain recovers from
/// both identically, so callers can still log which one happened without
/// adding branches nothing acts on differently.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker url \"{0}\" is invalid")]
    InvalidUrl(String),
    #[error("tracker scheme \"{0}\" is not supported")]
    UnsupportedScheme(String),
    #[error("an error occurred while connecting to the tracker, {0}")]
    Connection(String),
    #[error("tracker returned an unsuccessful status code {0}")]
    Status(u16),
    #[error("tracker reported a failure reason, {0}")]
    FailureReason(String),
    #[error("failed to parse the tracker response, {0}")]
    Protocol(String),
    #[error("timed out while performing the operation")]
    Timeout,
    #[error("no trackers are available for this torrent")]
    NoTrackers,
}

impl PartialEq for TrackerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidUrl(_), Self::InvalidUrl(_)) => true,
            (Self::UnsupportedScheme(_), Self::UnsupportedScheme(_)) => true,
            (Self::Connection(_), Self::Connection(_)) => true,
            (Self::Status(a), Self::Status(b)) => a == b,
            (Self::FailureReason(_), Self::FailureReason(_)) => true,
            (Self::Protocol(_), Self::Protocol(_)) => true,
            (Self::Timeout, Self::Timeout) => true,
            (Self::NoTrackers, Self::NoTrackers) => true,
            _ => false,
        }
    }
}

impl From<io::Error> for TrackerError {
    fn from(err: io::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<ParseError> for TrackerError {
    fn from(err: ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_bencode::error::Error> for TrackerError {
    fn from(err: serde_bencode::error::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Connection(err.to_string())
        }
    }
}
