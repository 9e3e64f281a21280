use serde::Deserialize;

/// The bencoded body of an HTTP tracker's announce response.
///
/// Only the fields the orchestrator cares about are kept: `interval`,
/// `min interval`, `complete`/`incomplete` peer counts, and an optional
/// `failure reason` which is treated as a protocol-level failure regardless
/// of HTTP status.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AnnounceResponse {
    #[serde(rename = "failure reason", default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(rename = "min interval", default)]
    pub min_interval: Option<u64>,
    #[serde(default)]
    pub complete: Option<u64>,
    #[serde(default)]
    pub incomplete: Option<u64>,
}

impl AnnounceResponse {
    pub fn seeders(&self) -> u64 {
        self.complete.unwrap_or(0)
    }

    pub fn leechers(&self) -> u64 {
        self.incomplete.unwrap_or(0)
    }

    pub fn interval_seconds(&self) -> Option<u64> {
        self.interval.or(self.min_interval)
    }
}
