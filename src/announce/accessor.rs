use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::announce::announcer::Announcer;
use crate::announce::request::AnnounceEvent;
use crate::client::{EmulatedClient, KeyRefreshPolicy};
use crate::connection::ConnectionProbe;
use crate::torrent::PeerId;
use crate::tracker::errors::{Result, TrackerError};

/// BitTorrent trackers expect raw binary fields (info-hash, peer-id)
/// percent-encoded with everything but unreserved characters escaped,
/// named `URL_ENCODE_RESERVED` to match the convention used for the peer
/// wire protocol elsewhere in this crate's ancestry.
const URL_ENCODE_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'~')
    .remove(b'.');

/// Builds the wire-level announce request (URL + headers) for a single
/// announcer/event pair.
///
/// Pure except for reading the current reported IP/port from the
/// [`ConnectionProbe`]: given the same announcer state, client fingerprint
/// and probe reading, it always builds the same request.
#[derive(Debug, Clone)]
pub struct AnnounceDataAccessor {
    client: EmulatedClient,
    peer_id: PeerId,
    probe: Arc<dyn ConnectionProbe>,
}

impl AnnounceDataAccessor {
    pub fn new(client: EmulatedClient, probe: Arc<dyn ConnectionProbe>) -> Self {
        let peer_id = PeerId::generate(&client.peer_id_prefix);
        Self {
            client,
            peer_id,
            probe,
        }
    }

    /// Build the announce URL for the given announcer and event.
    pub async fn build_url(&self, announcer: &Announcer, event: AnnounceEvent) -> Result<Url> {
        let tracker_url = announcer
            .current_tracker_url()
            .await
            .ok_or(TrackerError::NoTrackers)?;

        let numwant = if event == AnnounceEvent::Stopped {
            self.client.numwant_on_stop
        } else {
            self.client.numwant
        };

        let key = match self.client.key_refresh {
            KeyRefreshPolicy::PerTorrent => announcer.key(),
            KeyRefreshPolicy::PerRequest => rand::rng().random(),
        };

        let mut url = tracker_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("port", &self.probe.listening_port().to_string())
                .append_pair("uploaded", &announcer.uploaded().await.to_string())
                .append_pair("downloaded", &announcer.downloaded().await.to_string())
                .append_pair("left", &announcer.left().await.to_string())
                .append_pair("key", &format!("{:08X}", key))
                .append_pair("numwant", &numwant.to_string())
                .append_pair("compact", "1");
            if event != AnnounceEvent::None {
                pairs.append_pair("event", &event.to_string());
            }
        }

        // info_hash and peer_id must be percent-encoded raw bytes, not the
        // percent-encoded-text query pair encoder `url` applies by default,
        // so they're appended to the already-built query string directly.
        let info_hash_encoded =
            percent_encoding::percent_encode(announcer.info_hash().as_bytes(), URL_ENCODE_RESERVED)
                .to_string();
        let peer_id_encoded =
            percent_encoding::percent_encode(self.peer_id.as_bytes(), URL_ENCODE_RESERVED).to_string();

        let joined = format!(
            "{}&info_hash={}&peer_id={}",
            url, info_hash_encoded, peer_id_encoded
        );
        Ok(Url::parse(&joined)?)
    }

    /// Build the headers advertised for this announce, from the emulated
    /// client's fingerprint.
    pub fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("user-agent"),
            HeaderValue::from_str(&self.client.user_agent).unwrap_or(HeaderValue::from_static("")),
        );
        headers.insert(
            HeaderName::from_static("accept-encoding"),
            HeaderValue::from_str(&self.client.accept_encoding).unwrap_or(HeaderValue::from_static("")),
        );
        headers.insert(
            HeaderName::from_static("connection"),
            HeaderValue::from_str(&self.client.connection).unwrap_or(HeaderValue::from_static("")),
        );
        headers
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }
}
