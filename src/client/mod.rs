use std::path::Path;

use serde::Deserialize;

use crate::errors::{GhostSeedError, Result};

/// When the announce data accessor should generate a fresh session `key`
/// rotation policy: some clients mint a new one on every request, others keep a
/// single value for the lifetime of a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRefreshPolicy {
    PerRequest,
    PerTorrent,
}

/// The fingerprint of an emulated BitTorrent client, loaded from a JSON file
/// under `clients/`.
///
/// This is the minimal shape the announce data accessor needs:
/// enough to build a plausible peer-id, query string, and header set. It
/// does not attempt to model a client's full wire behavior (handshake
/// reserved bits, extension protocol, etc.) since this system never speaks
/// the peer wire protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmulatedClient {
    pub name: String,
    pub peer_id_prefix: String,
    pub user_agent: String,
    #[serde(default = "default_accept_encoding")]
    pub accept_encoding: String,
    #[serde(default = "default_connection")]
    pub connection: String,
    #[serde(default = "default_numwant")]
    pub numwant: u32,
    #[serde(default = "default_numwant_on_stop")]
    pub numwant_on_stop: u32,
    #[serde(default = "default_key_refresh")]
    pub key_refresh: KeyRefreshPolicy,
}

fn default_accept_encoding() -> String {
    "gzip".to_string()
}

fn default_connection() -> String {
    "close".to_string()
}

fn default_numwant() -> u32 {
    200
}

fn default_numwant_on_stop() -> u32 {
    0
}

fn default_key_refresh() -> KeyRefreshPolicy {
    KeyRefreshPolicy::PerTorrent
}

impl EmulatedClient {
    /// Load a client fingerprint from `<clients_dir>/<name>.json`.
    pub fn load<P: AsRef<Path>>(clients_dir: P, name: &str) -> Result<Self> {
        let path = clients_dir.as_ref().join(format!("{}.json", name));
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            GhostSeedError::ConfigIo(format!(
                "failed to read client fingerprint {}: {}",
                path.display(),
                e
            ))
        })?;
        let client: Self = serde_json::from_str(&raw)
            .map_err(|e| GhostSeedError::ConfigInvalid(format!("invalid client fingerprint, {}", e)))?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_client_fingerprint() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("qbittorrent.json"),
            r#"{
                "name": "qBittorrent",
                "peer_id_prefix": "-qB4650-",
                "user_agent": "qBittorrent/4.6.5",
                "numwant": 200
            }"#,
        )
        .unwrap();

        let client = EmulatedClient::load(dir.path(), "qbittorrent").unwrap();

        assert_eq!("qBittorrent", client.name);
        assert_eq!("-qB4650-", client.peer_id_prefix);
        assert_eq!(200, client.numwant);
        assert_eq!(KeyRefreshPolicy::PerTorrent, client.key_refresh);
    }

    #[test]
    fn test_load_missing_client_fails() {
        let dir = tempdir().unwrap();

        let result = EmulatedClient::load(dir.path(), "nonexistent");

        assert!(result.is_err());
    }
}
