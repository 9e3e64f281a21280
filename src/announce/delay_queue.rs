use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

use crate::announce::request::{AnnounceEvent, AnnounceRequest};
use crate::torrent::InfoHash;

/// A fallback poll interval so `get_available` re-checks even if a
/// `notify_waiters()` call is missed due to a race between a sleep future
/// being dropped and a concurrent `add_or_replace`.
const POLL_FALLBACK: Duration = Duration::from_millis(250);

/// The time-ordered delay queue, keyed by `InfoHash` so at most one
/// entry per torrent is ever pending.
#[derive(Debug, Clone)]
pub struct DelayQueue {
    entries: Arc<Mutex<HashMap<InfoHash, AnnounceRequest>>>,
    waker: Arc<Notify>,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            waker: Arc::new(Notify::new()),
        }
    }

    /// Insert an entry to become due after `delay`, replacing any pending
    /// entry for the same torrent.
    pub async fn add_or_replace(&self, info_hash: InfoHash, event: AnnounceEvent, delay: Duration) {
        let ready_at = Instant::now() + delay;
        let request = AnnounceRequest::new(info_hash.clone(), event, ready_at);
        {
            let mut entries = self.entries.lock().await;
            entries.insert(info_hash, request);
        }
        self.waker.notify_waiters();
    }

    /// Block until at least one entry is due, then return and remove every
    /// due entry, ordered by `ready_at`.
    pub async fn get_available(&self) -> Vec<AnnounceRequest> {
        loop {
            let (due, wait) = {
                let mut entries = self.entries.lock().await;
                let now = Instant::now();
                let due_hashes: Vec<InfoHash> = entries
                    .iter()
                    .filter(|(_, r)| r.ready_at <= now)
                    .map(|(hash, _)| hash.clone())
                    .collect();

                if !due_hashes.is_empty() {
                    let mut due: Vec<AnnounceRequest> = due_hashes
                        .into_iter()
                        .filter_map(|hash| entries.remove(&hash))
                        .collect();
                    due.sort_by_key(|r| r.ready_at);
                    (Some(due), None)
                } else {
                    let next_wait = entries
                        .values()
                        .map(|r| r.ready_at.saturating_duration_since(now))
                        .min()
                        .unwrap_or(POLL_FALLBACK)
                        .min(POLL_FALLBACK);
                    (None, Some(next_wait))
                }
            };

            if let Some(due) = due {
                return due;
            }

            let wait = wait.unwrap_or(POLL_FALLBACK);
            tokio::select! {
                _ = self.waker.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Return and remove every entry regardless of time, without blocking.
    pub async fn drain_all(&self) -> Vec<AnnounceRequest> {
        let mut entries = self.entries.lock().await;
        let mut drained: Vec<AnnounceRequest> = entries.drain().map(|(_, r)| r).collect();
        drained.sort_by_key(|r| r.ready_at);
        drained
    }

    /// Remove any pending entry for `info_hash`, if present.
    pub async fn remove(&self, info_hash: &InfoHash) {
        let mut entries = self.entries.lock().await;
        entries.remove(info_hash);
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for DelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> InfoHash {
        InfoHash::from_info_dict([byte])
    }

    #[tokio::test]
    async fn test_add_or_replace_replaces_pending_entry() {
        let queue = DelayQueue::new();
        let hash = hash(1);

        queue
            .add_or_replace(hash.clone(), AnnounceEvent::Started, Duration::from_secs(60))
            .await;
        queue
            .add_or_replace(hash.clone(), AnnounceEvent::Stopped, Duration::from_millis(0))
            .await;

        let due = queue.get_available().await;

        assert_eq!(1, due.len());
        assert_eq!(AnnounceEvent::Stopped, due[0].event);
    }

    #[tokio::test]
    async fn test_get_available_returns_only_due_entries_in_order() {
        let queue = DelayQueue::new();
        queue
            .add_or_replace(hash(1), AnnounceEvent::Started, Duration::from_millis(0))
            .await;
        queue
            .add_or_replace(hash(2), AnnounceEvent::Started, Duration::from_secs(60))
            .await;

        let due = queue.get_available().await;

        assert_eq!(1, due.len());
        assert_eq!(hash(1), due[0].info_hash);
    }

    #[tokio::test]
    async fn test_drain_all_returns_everything_regardless_of_time() {
        let queue = DelayQueue::new();
        queue
            .add_or_replace(hash(1), AnnounceEvent::Started, Duration::from_secs(60))
            .await;
        queue
            .add_or_replace(hash(2), AnnounceEvent::Started, Duration::from_secs(120))
            .await;

        let drained = queue.drain_all().await;

        assert_eq!(2, drained.len());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove() {
        let queue = DelayQueue::new();
        queue
            .add_or_replace(hash(1), AnnounceEvent::Started, Duration::from_secs(60))
            .await;

        queue.remove(&hash(1)).await;

        assert!(queue.is_empty().await);
    }
}
