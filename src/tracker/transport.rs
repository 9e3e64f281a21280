use std::time::Duration;

use log::{debug, trace};
use reqwest::Client;
use url::Url;

use crate::tracker::errors::{Result, TrackerError};
use crate::tracker::response::AnnounceResponse;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POOL_PER_ROUTE: usize = 100;

/// The single shared HTTP transport used to speak to every HTTP(S) tracker.
///
/// Wraps one `reqwest::Client` with a bounded per-route idle-connection pool
/// and separate connect/read timeouts.
#[derive(Debug, Clone)]
pub struct TrackerTransport {
    client: Client,
}

impl TrackerTransport {
    pub fn new() -> Self {
        Self::builder(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn builder(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .pool_max_idle_per_host(DEFAULT_POOL_PER_ROUTE)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("expected a valid http client");

        Self { client }
    }

    /// Perform a single announce GET against the given, fully-built URL.
    ///
    /// The request carries the headers produced by the announce data
    /// accessor (user-agent, accept-encoding, connection) so the wire shape
    /// matches the emulated client's fingerprint.
    pub async fn announce(&self, url: Url, headers: reqwest::header::HeaderMap) -> Result<AnnounceResponse> {
        trace!("Sending announce request to {}", url);
        let response = self.client.get(url.clone()).headers(headers).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            debug!(
                "Tracker {} returned status {} with body {}",
                url,
                status,
                String::from_utf8_lossy(&bytes)
            );
            return Err(TrackerError::Status(status.as_u16()));
        }

        trace!(
            "Tracker {} replied {} bytes: {}",
            url,
            bytes.len(),
            String::from_utf8_lossy(&bytes)
        );
        let parsed: AnnounceResponse = serde_bencode::from_bytes(bytes.as_ref())?;
        if let Some(reason) = &parsed.failure_reason {
            return Err(TrackerError::FailureReason(reason.clone()));
        }

        Ok(parsed)
    }
}

impl Default for TrackerTransport {
    fn default() -> Self {
        Self::new()
    }
}
