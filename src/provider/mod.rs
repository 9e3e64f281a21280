use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fx_callback::{Callback, MultiThreadedCallback, Subscriber, Subscription};
use itertools::Itertools;
use log::{debug, error, warn};
use rand::Rng;
use tokio::select;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::errors::{GhostSeedError, Result};
use crate::torrent::{InfoHash, TorrentMetadata};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
const TORRENT_EXTENSION: &str = "torrent";

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Added(TorrentMetadata),
    Removed(InfoHash),
}

struct KnownTorrent {
    path: PathBuf,
    modified: Option<SystemTime>,
    metadata: TorrentMetadata,
}

/// Watches the torrents directory for `.torrent` files, parsing and
/// validating each one and exposing the result through add/remove events.
///
/// Directory-change notification is done by periodic re-scan rather than an
/// OS file-watch API: a scan every few seconds is indistinguishable from
/// realtime at this crate's scale, and it avoids a platform-specific
/// dependency for a single directory with a handful of files.
pub struct TorrentFileProvider {
    torrents_dir: PathBuf,
    archived_dir: PathBuf,
    poll_interval: Duration,
    known: RwLock<HashMap<InfoHash, KnownTorrent>>,
    callbacks: MultiThreadedCallback<ProviderEvent>,
}

impl TorrentFileProvider {
    pub fn new(torrents_dir: impl Into<PathBuf>, archived_dir: impl Into<PathBuf>) -> Self {
        Self::with_poll_interval(torrents_dir, archived_dir, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        torrents_dir: impl Into<PathBuf>,
        archived_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            torrents_dir: torrents_dir.into(),
            archived_dir: archived_dir.into(),
            poll_interval,
            known: RwLock::new(HashMap::new()),
            callbacks: MultiThreadedCallback::new(),
        }
    }

    /// Run the poll loop until `token` is cancelled. An initial scan is
    /// always performed before the first sleep so startup sees every file
    /// already on disk without waiting a full poll interval.
    pub async fn run(&self, token: CancellationToken) {
        self.scan_once().await;

        loop {
            select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => self.scan_once().await,
            }
        }
        debug!("Torrent file provider poll loop has stopped");
    }

    pub(crate) async fn scan_once(&self) {
        let entries = match self.list_torrent_files().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to scan torrents directory, {}", e);
                return;
            }
        };
        let on_disk: HashMap<PathBuf, Option<SystemTime>> = entries.into_iter().collect();

        // A path that disappeared entirely is a removal. A path that is
        // still present but whose mtime moved on is treated as the same
        // delete-then-create pair an OS file-watcher would report for an
        // in-place modify: removed here, re-ingested (and so re-parsed and
        // re-hashed) in the loop below.
        let stale: Vec<InfoHash> = {
            let known = self.known.read().await;
            known
                .iter()
                .filter(|(_, k)| match on_disk.get(&k.path) {
                    None => true,
                    Some(current_mtime) => *current_mtime != k.modified,
                })
                .map(|(hash, _)| hash.clone())
                .collect()
        };
        for hash in stale {
            self.known.write().await.remove(&hash);
            self.callbacks.invoke(ProviderEvent::Removed(hash));
        }

        let already_known: HashSet<PathBuf> = {
            let known = self.known.read().await;
            known.values().map(|k| k.path.clone()).collect()
        };

        for (path, modified) in on_disk {
            if already_known.contains(&path) {
                continue;
            }
            self.ingest(path, modified).await;
        }
    }

    async fn ingest(&self, path: PathBuf, modified: Option<SystemTime>) {
        match TorrentMetadata::parse_file(&path) {
            Ok(metadata) => {
                let info_hash = metadata.info_hash.clone();
                debug!(
                    "Discovered {} ({}), trackers: {}",
                    metadata.name,
                    info_hash,
                    metadata.trackers.iter().flatten().join(", ")
                );
                self.known.write().await.insert(
                    info_hash,
                    KnownTorrent {
                        path,
                        modified,
                        metadata: metadata.clone(),
                    },
                );
                self.callbacks.invoke(ProviderEvent::Added(metadata));
            }
            Err(e) => {
                warn!("Failed to parse {}, archiving it: {}", path.display(), e);
                self.archive(&path);
            }
        }
    }

    fn archive(&self, path: &Path) {
        if let Some(name) = path.file_name() {
            let destination = self.archived_dir.join(name);
            if let Err(e) = std::fs::rename(path, &destination) {
                error!(
                    "Failed to archive {} to {}, {}",
                    path.display(),
                    destination.display(),
                    e
                );
            }
        }
    }

    async fn list_torrent_files(&self) -> Result<Vec<(PathBuf, Option<SystemTime>)>> {
        let dir = std::fs::read_dir(&self.torrents_dir)?;
        let mut files = Vec::new();
        for entry in dir {
            let entry = entry?;
            let path = entry.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(TORRENT_EXTENSION)
            {
                let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
                files.push((path, modified));
            }
        }
        Ok(files)
    }

    /// A uniformly random torrent from the known set minus `excluded`.
    pub async fn get_torrent_not_in(&self, excluded: &HashSet<InfoHash>) -> Result<TorrentMetadata> {
        let known = self.known.read().await;
        let candidates: Vec<&TorrentMetadata> = known
            .iter()
            .filter(|(hash, _)| !excluded.contains(hash))
            .map(|(_, known)| &known.metadata)
            .collect();

        if candidates.is_empty() {
            return Err(GhostSeedError::NoMoreTorrentsAvailable);
        }
        let index = rand::rng().random_range(0..candidates.len());
        Ok(candidates[index].clone())
    }

    pub async fn known_info_hashes(&self) -> Vec<InfoHash> {
        self.known.read().await.keys().cloned().collect()
    }

    /// Move a known torrent's meta-info file to `archived/`, drop it from
    /// the known set, and fire the `Removed` event so subscribers react the
    /// same way they would to a manual removal from the torrents directory.
    pub async fn archive_torrent(&self, info_hash: &InfoHash) -> Result<()> {
        let path = {
            let mut known = self.known.write().await;
            known
                .remove(info_hash)
                .map(|known| known.path)
                .ok_or_else(|| GhostSeedError::TorrentNotFound(info_hash.clone()))?
        };
        self.archive(&path);
        self.callbacks.invoke(ProviderEvent::Removed(info_hash.clone()));
        Ok(())
    }
}

impl Callback<ProviderEvent> for TorrentFileProvider {
    fn subscribe(&self) -> Subscription<ProviderEvent> {
        self.callbacks.subscribe()
    }

    fn subscribe_with(&self, subscriber: Subscriber<ProviderEvent>) {
        self.callbacks.subscribe_with(subscriber)
    }
}
