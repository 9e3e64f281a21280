use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fx_callback::{Callback, Subscription};
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::announce::{
    AnnounceEvent, AnnounceExecutor, AnnounceRequest, Announcer, DelayQueue,
    OrchestratorNotifications, ResponseHandlerChain,
};
use crate::bandwidth::BandwidthDispatcher;
use crate::hitandrun::{HitAndRunEvent, HitAndRunTracker};
use crate::provider::{ProviderEvent, TorrentFileProvider};
use crate::torrent::{InfoHash, TorrentMetadata};

/// The delay the provider-removal reaction gives a torrent's pending
/// requests to settle before the terminal `stopped` announce is enqueued.
const REMOVAL_STOP_DELAY: Duration = Duration::from_secs(1);

/// The active-set cap and archival policy the orchestrator enforces,
/// extracted from [`crate::config::Config`] so this module doesn't depend
/// on the config file's exact shape.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub simultaneous_seed: i64,
    pub keep_torrent_with_zero_leechers: bool,
    pub archive_on_too_many_failures: bool,
}

impl OrchestratorConfig {
    pub fn is_unbounded(&self) -> bool {
        self.simultaneous_seed == -1
    }
}

/// The set of torrents currently under active announcement, in MRU order:
/// the tail is the torrent whose request was most recently dispatched.
#[derive(Default)]
struct ActiveSet {
    announcers: HashMap<InfoHash, Arc<Announcer>>,
    order: VecDeque<InfoHash>,
}

impl ActiveSet {
    fn insert(&mut self, info_hash: InfoHash, announcer: Arc<Announcer>) {
        self.order.push_back(info_hash.clone());
        self.announcers.insert(info_hash, announcer);
    }

    fn remove(&mut self, info_hash: &InfoHash) -> Option<Arc<Announcer>> {
        self.order.retain(|hash| hash != info_hash);
        self.announcers.remove(info_hash)
    }

    /// Move `info_hash` to the tail of the order, marking it most-recently-used.
    fn touch(&mut self, info_hash: &InfoHash) {
        if self.announcers.contains_key(info_hash) {
            self.order.retain(|hash| hash != info_hash);
            self.order.push_back(info_hash.clone());
        }
    }

    fn get(&self, info_hash: &InfoHash) -> Option<Arc<Announcer>> {
        self.announcers.get(info_hash).cloned()
    }

    fn contains(&self, info_hash: &InfoHash) -> bool {
        self.announcers.contains_key(info_hash)
    }

    fn len(&self) -> usize {
        self.announcers.len()
    }

    fn info_hashes(&self) -> Vec<InfoHash> {
        self.order.iter().cloned().collect()
    }
}

/// Signals the response handler chain raises back into the orchestrator,
/// carried over a channel rather than a parent pointer so the handler
/// chain only ever holds a narrow send capability, never an `Arc` back to
/// the orchestrator that owns it.
enum OrchestratorSignal {
    NoMorePeers(InfoHash),
    UploadRatioLimitReached(InfoHash),
    TorrentHasStopped(InfoHash),
    TooManyFailedInARow(InfoHash),
}

struct SignalSink(mpsc::UnboundedSender<OrchestratorSignal>);

#[async_trait]
impl OrchestratorNotifications for SignalSink {
    async fn on_no_more_peers(&self, info_hash: InfoHash) {
        let _ = self.0.send(OrchestratorSignal::NoMorePeers(info_hash));
    }

    async fn on_upload_ratio_limit_reached(&self, info_hash: InfoHash) {
        let _ = self.0.send(OrchestratorSignal::UploadRatioLimitReached(info_hash));
    }

    async fn on_torrent_has_stopped(&self, info_hash: InfoHash) {
        let _ = self.0.send(OrchestratorSignal::TorrentHasStopped(info_hash));
    }

    async fn on_too_many_failed_in_a_row(&self, info_hash: InfoHash) {
        let _ = self.0.send(OrchestratorSignal::TooManyFailedInARow(info_hash));
    }
}

/// Owns the seeding set: the per-torrent [`Announcer`]s currently being
/// kept alive, bounded by `simultaneousSeed`. Reacts to file-provider
/// add/remove events and to the response handler chain's terminal signals,
/// drives the scheduling loop that drains the delay queue into the
/// announce executor, and sequences a clean shutdown.
///
/// `new -> start -> (running) -> stop` is the only supported lifecycle;
/// starting an instance again after `stop()` is not supported.
pub struct Orchestrator {
    config: OrchestratorConfig,
    delay_queue: Arc<DelayQueue>,
    executor: Arc<AnnounceExecutor>,
    handler_chain: Arc<ResponseHandlerChain>,
    bandwidth: Arc<BandwidthDispatcher>,
    provider: Arc<TorrentFileProvider>,
    hit_and_run: Arc<HitAndRunTracker>,
    active: RwLock<ActiveSet>,
    stopped: AtomicBool,
    token: CancellationToken,
    signal_receiver: Mutex<Option<mpsc::UnboundedReceiver<OrchestratorSignal>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        delay_queue: Arc<DelayQueue>,
        executor: Arc<AnnounceExecutor>,
        bandwidth: Arc<BandwidthDispatcher>,
        provider: Arc<TorrentFileProvider>,
        hit_and_run: Arc<HitAndRunTracker>,
        upload_ratio_target: f64,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let notifications: Arc<dyn OrchestratorNotifications> = Arc::new(SignalSink(sender));
        let handler_chain = Arc::new(ResponseHandlerChain::new(
            delay_queue.clone(),
            bandwidth.clone(),
            notifications,
            upload_ratio_target,
        ));

        Arc::new(Self {
            config,
            delay_queue,
            executor,
            handler_chain,
            bandwidth,
            provider,
            hit_and_run,
            active: RwLock::new(ActiveSet::default()),
            stopped: AtomicBool::new(false),
            token: CancellationToken::new(),
            signal_receiver: Mutex::new(Some(receiver)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Activate the initial seeding set, subscribe to the file provider, and
    /// spawn the scheduling and reaction loops.
    pub async fn start(self: &Arc<Self>) {
        let limit = if self.config.is_unbounded() {
            None
        } else {
            Some(self.config.simultaneous_seed.max(0) as usize)
        };
        for metadata in self.pick_initial_torrents(limit).await {
            self.activate(metadata).await;
        }

        let provider_events = self.provider.subscribe();
        let hit_and_run_events = self.hit_and_run.subscribe();
        let signal_receiver = self
            .signal_receiver
            .lock()
            .await
            .take()
            .expect("orchestrator started twice");

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(self.clone().run_reactor(
            provider_events,
            hit_and_run_events,
            signal_receiver,
        )));
        tasks.push(tokio::spawn(self.clone().run_scheduler()));

        info!(
            "Orchestrator started with {} active torrent(s)",
            self.active.read().await.len()
        );
    }

    /// Select the startup seeding set: every known torrent when
    /// `simultaneousSeed == -1`, else up to `limit` distinct torrents chosen
    /// uniformly at random.
    async fn pick_initial_torrents(&self, limit: Option<usize>) -> Vec<TorrentMetadata> {
        let mut excluded = HashSet::new();
        let mut picked = Vec::new();

        loop {
            if let Some(limit) = limit {
                if picked.len() >= limit {
                    break;
                }
            }
            match self.provider.get_torrent_not_in(&excluded).await {
                Ok(metadata) => {
                    excluded.insert(metadata.info_hash.clone());
                    picked.push(metadata);
                }
                Err(_) => break,
            }
        }

        picked
    }

    async fn activate(&self, metadata: TorrentMetadata) {
        let info_hash = metadata.info_hash.clone();
        let announcer = Arc::new(Announcer::new(metadata));

        self.active.write().await.insert(info_hash.clone(), announcer);
        self.bandwidth.register_torrent(info_hash.clone()).await;
        self.hit_and_run.start(info_hash.clone()).await;
        self.delay_queue
            .add_or_replace(info_hash, AnnounceEvent::Started, Duration::ZERO)
            .await;
    }

    async fn deactivate(&self, info_hash: &InfoHash) {
        let removed = self.active.write().await.remove(info_hash);
        if removed.is_some() {
            self.bandwidth.unregister_torrent(info_hash).await;
            self.hit_and_run.stop(info_hash.clone()).await;
            self.delay_queue.remove(info_hash).await;
        }
    }

    async fn run_reactor(
        self: Arc<Self>,
        mut provider_events: Subscription<ProviderEvent>,
        mut hit_and_run_events: Subscription<HitAndRunEvent>,
        mut signals: mpsc::UnboundedReceiver<OrchestratorSignal>,
    ) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                Some(event) = provider_events.recv() => self.handle_provider_event(&event).await,
                Some(event) = hit_and_run_events.recv() => self.handle_hit_and_run_event(&event).await,
                Some(signal) = signals.recv() => self.handle_signal(signal).await,
                else => break,
            }
        }
        debug!("Orchestrator reaction loop has stopped");
    }

    async fn run_scheduler(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                due = self.delay_queue.get_available() => {
                    for request in due {
                        self.dispatch(request).await;
                    }
                }
            }
        }
        debug!("Orchestrator scheduling loop has stopped");
    }

    async fn dispatch(&self, request: AnnounceRequest) {
        let announcer = {
            let mut active = self.active.write().await;
            active.touch(&request.info_hash);
            active.get(&request.info_hash)
        };

        match announcer {
            Some(announcer) => {
                self.executor
                    .submit(announcer, request.event, self.handler_chain.clone());
            }
            None => warn!(
                "Dropping {:?} request for {}, no active announcer",
                request.event, request.info_hash
            ),
        }
    }

    async fn handle_provider_event(&self, event: &ProviderEvent) {
        match event {
            ProviderEvent::Added(metadata) => self.on_torrent_file_added(metadata.clone()).await,
            ProviderEvent::Removed(info_hash) => self.on_torrent_file_removed(info_hash.clone()).await,
        }
    }

    async fn on_torrent_file_added(&self, metadata: TorrentMetadata) {
        let info_hash = metadata.info_hash.clone();
        let has_room = {
            let active = self.active.read().await;
            !active.contains(&info_hash)
                && (self.config.is_unbounded() || (active.len() as i64) < self.config.simultaneous_seed)
        };

        if has_room {
            info!("Activating newly discovered torrent {}", info_hash);
            self.activate(metadata).await;
        } else {
            debug!("Not activating {}, simultaneous seed cap reached", info_hash);
        }
    }

    /// A torrent has gone non-seeding for longer than `maxNonSeedingMs`
    /// without ever reaching `requiredSeedingMs`: archive it the same way a
    /// ratio-limit breach does, so the lifecycle manager actually reacts to
    /// hit-and-run non-compliance rather than only logging it.
    async fn handle_hit_and_run_event(&self, event: &HitAndRunEvent) {
        match event {
            HitAndRunEvent::ComplianceBreached(info_hash) => {
                warn!("{} breached hit-and-run compliance, archiving it", info_hash);
                self.archive(info_hash.clone()).await;
            }
        }
    }

    async fn on_torrent_file_removed(&self, info_hash: InfoHash) {
        let is_active = self.active.read().await.contains(&info_hash);
        if is_active {
            self.delay_queue
                .add_or_replace(info_hash, AnnounceEvent::Stopped, REMOVAL_STOP_DELAY)
                .await;
        }
    }

    async fn handle_signal(&self, signal: OrchestratorSignal) {
        match signal {
            OrchestratorSignal::NoMorePeers(info_hash) => {
                if !self.config.keep_torrent_with_zero_leechers {
                    self.archive(info_hash).await;
                }
            }
            OrchestratorSignal::UploadRatioLimitReached(info_hash) => self.archive(info_hash).await,
            OrchestratorSignal::TorrentHasStopped(info_hash) => {
                self.deactivate(&info_hash).await;
                if !self.stopped.load(Ordering::SeqCst) {
                    self.promote_replacement().await;
                }
            }
            OrchestratorSignal::TooManyFailedInARow(info_hash) => {
                if self.config.archive_on_too_many_failures {
                    self.archive(info_hash).await;
                } else {
                    warn!(
                        "{} failed too many times in a row, dropping it from the active set \
                         without archiving (archive_on_too_many_failures is disabled)",
                        info_hash
                    );
                    self.deactivate(&info_hash).await;
                    if !self.stopped.load(Ordering::SeqCst) {
                        self.promote_replacement().await;
                    }
                }
            }
        }
    }

    /// Move a torrent's meta-info file to `archived/`; the resulting
    /// `ProviderEvent::Removed` is what actually drives it out of the
    /// active set, via [`Self::on_torrent_file_removed`].
    async fn archive(&self, info_hash: InfoHash) {
        if let Err(e) = self.provider.archive_torrent(&info_hash).await {
            warn!("Failed to archive {}, {}", info_hash, e);
        }
    }

    async fn promote_replacement(&self) {
        let excluded: HashSet<InfoHash> = self.active.read().await.info_hashes().into_iter().collect();
        match self.provider.get_torrent_not_in(&excluded).await {
            Ok(metadata) => {
                info!("Promoting replacement torrent {}", metadata.info_hash);
                self.activate(metadata).await;
            }
            Err(_) => debug!("No replacement torrent available to promote"),
        }
    }

    /// A snapshot of the torrents currently in the active set, oldest-touched first.
    pub async fn active_torrents(&self) -> Vec<InfoHash> {
        self.active.read().await.info_hashes()
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Stop sequence: cancel the reaction/scheduling loops, drain the
    /// delay queue and convert every surviving non-`started` request into
    /// a `stopped` announce, then block until the executor has drained.
    pub async fn stop(self: &Arc<Self>) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping orchestrator");

        self.token.cancel();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                warn!("Orchestrator background task panicked, {}", e);
            }
        }

        let drained = self.delay_queue.drain_all().await;
        for request in drained {
            if request.event == AnnounceEvent::Started {
                debug!(
                    "Discarding pending started request for {} at shutdown, the tracker never learned of it",
                    request.info_hash
                );
                continue;
            }
            let stopped_request =
                AnnounceRequest::new(request.info_hash, AnnounceEvent::Stopped, request.ready_at);
            self.dispatch(stopped_request).await;
        }

        self.executor.await_running_tasks().await;

        // the reaction loop is gone by now, so any `on_torrent_has_stopped`
        // signal raised by the stopped announces above has nobody left to
        // receive it; tear the active set down directly instead.
        let remaining = self.active.read().await.info_hashes();
        for info_hash in remaining {
            self.deactivate(&info_hash).await;
        }

        info!("Orchestrator has stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::AnnounceDataAccessor;
    use crate::client::{EmulatedClient, KeyRefreshPolicy};
    use crate::connection::StaticConnectionProbe;
    use crate::tracker::TrackerTransport;
    use serde_bencode::value::Value;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_torrent(dir: &Path, name: &str, tracker_url: &str) {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), Value::Bytes(name.as_bytes().to_vec()));
        info.insert(b"piece length".to_vec(), Value::Int(16384));
        info.insert(b"pieces".to_vec(), Value::Bytes(vec![0u8; 20]));
        info.insert(b"length".to_vec(), Value::Int(10));

        let mut root = BTreeMap::new();
        root.insert(b"info".to_vec(), Value::Dict(info));
        root.insert(
            b"announce".to_vec(),
            Value::Bytes(tracker_url.as_bytes().to_vec()),
        );

        let bytes = serde_bencode::to_bytes(&Value::Dict(root)).unwrap();
        std::fs::write(dir.join(format!("{}.torrent", name)), bytes).unwrap();
    }

    fn client() -> EmulatedClient {
        EmulatedClient {
            name: "test".to_string(),
            peer_id_prefix: "-gS0010-".to_string(),
            user_agent: "GhostSeed/0.1".to_string(),
            accept_encoding: "gzip".to_string(),
            connection: "close".to_string(),
            numwant: 200,
            numwant_on_stop: 0,
            key_refresh: KeyRefreshPolicy::PerTorrent,
        }
    }

    fn make_orchestrator(
        config: OrchestratorConfig,
        provider: Arc<TorrentFileProvider>,
        port: u16,
    ) -> Arc<Orchestrator> {
        let probe = Arc::new(StaticConnectionProbe::new(None, port));
        let accessor = Arc::new(AnnounceDataAccessor::new(client(), probe));
        let executor = Arc::new(AnnounceExecutor::new(accessor, TrackerTransport::new()));
        let delay_queue = Arc::new(DelayQueue::new());
        let bandwidth = Arc::new(BandwidthDispatcher::new(1000, 2000));
        let dir = tempdir().unwrap();
        let hit_and_run = Arc::new(HitAndRunTracker::new(
            dir.path().join("elapsed-times.json"),
            604_800_000,
            259_200_000,
        ));

        Orchestrator::new(config, delay_queue, executor, bandwidth, provider, hit_and_run, -1.0)
    }

    #[tokio::test]
    async fn test_unbounded_cap_activates_every_torrent() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET);
            then.status(200)
                .body(b"d8:intervali1800e8:completei5e10:incompletei5ee".to_vec());
        });

        let root = tempdir().unwrap();
        let torrents_dir = root.path().join("torrents");
        let archived_dir = torrents_dir.join("archived");
        std::fs::create_dir_all(&archived_dir).unwrap();
        write_torrent(&torrents_dir, "a", &format!("{}/announce", server.base_url()));
        write_torrent(&torrents_dir, "b", &format!("{}/announce", server.base_url()));
        write_torrent(&torrents_dir, "c", &format!("{}/announce", server.base_url()));

        let provider = Arc::new(TorrentFileProvider::new(&torrents_dir, &archived_dir));
        provider.scan_once().await;

        let config = OrchestratorConfig {
            simultaneous_seed: -1,
            keep_torrent_with_zero_leechers: true,
            archive_on_too_many_failures: false,
        };
        let orchestrator = make_orchestrator(config, provider, 6881);

        orchestrator.start().await;

        assert_eq!(3, orchestrator.active_count().await);

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_bounded_cap_activates_only_up_to_limit() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET);
            then.status(200)
                .body(b"d8:intervali1800e8:completei5e10:incompletei5ee".to_vec());
        });

        let root = tempdir().unwrap();
        let torrents_dir = root.path().join("torrents");
        let archived_dir = torrents_dir.join("archived");
        std::fs::create_dir_all(&archived_dir).unwrap();
        write_torrent(&torrents_dir, "a", &format!("{}/announce", server.base_url()));
        write_torrent(&torrents_dir, "b", &format!("{}/announce", server.base_url()));
        write_torrent(&torrents_dir, "c", &format!("{}/announce", server.base_url()));

        let provider = Arc::new(TorrentFileProvider::new(&torrents_dir, &archived_dir));
        provider.scan_once().await;

        let config = OrchestratorConfig {
            simultaneous_seed: 1,
            keep_torrent_with_zero_leechers: true,
            archive_on_too_many_failures: false,
        };
        let orchestrator = make_orchestrator(config, provider, 6882);

        orchestrator.start().await;

        assert_eq!(1, orchestrator.active_count().await);

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_start_stop_round_trip_issues_started_then_stopped() {
        let server = httpmock::MockServer::start();
        let started_mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).query_param("event", "started");
            then.status(200)
                .body(b"d8:intervali1800e8:completei5e10:incompletei5ee".to_vec());
        });
        let stopped_mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).query_param("event", "stopped");
            then.status(200)
                .body(b"d8:intervali1800e8:completei5e10:incompletei5ee".to_vec());
        });

        let root = tempdir().unwrap();
        let torrents_dir = root.path().join("torrents");
        let archived_dir = torrents_dir.join("archived");
        std::fs::create_dir_all(&archived_dir).unwrap();
        write_torrent(&torrents_dir, "a", &format!("{}/announce", server.base_url()));

        let provider = Arc::new(TorrentFileProvider::new(&torrents_dir, &archived_dir));
        provider.scan_once().await;

        let config = OrchestratorConfig {
            simultaneous_seed: 1,
            keep_torrent_with_zero_leechers: true,
            archive_on_too_many_failures: false,
        };
        let orchestrator = make_orchestrator(config, provider, 6883);

        orchestrator.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        started_mock.assert_hits(1);

        orchestrator.stop().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopped_mock.assert_hits_async(1).await;

        assert_eq!(0, orchestrator.active_count().await);
        assert!(orchestrator.delay_queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_peers_archives_the_torrent_and_deactivates_it() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET);
            then.status(200)
                .body(b"d8:intervali1800e8:completei0e10:incompletei0ee".to_vec());
        });

        let root = tempdir().unwrap();
        let torrents_dir = root.path().join("torrents");
        let archived_dir = torrents_dir.join("archived");
        std::fs::create_dir_all(&archived_dir).unwrap();
        write_torrent(&torrents_dir, "a", &format!("{}/announce", server.base_url()));

        let provider = Arc::new(TorrentFileProvider::new(&torrents_dir, &archived_dir));
        provider.scan_once().await;

        let config = OrchestratorConfig {
            simultaneous_seed: -1,
            keep_torrent_with_zero_leechers: false,
            archive_on_too_many_failures: false,
        };
        let orchestrator = make_orchestrator(config, provider.clone(), 6884);

        orchestrator.start().await;
        tokio::time::sleep(Duration::from_millis(1700)).await;

        // the torrent has no peers, so it should be archived and dropped once
        // the trailing stopped announce completes
        assert_eq!(0, orchestrator.active_count().await);
        assert!(provider.known_info_hashes().await.is_empty());
        assert!(archived_dir.join("a.torrent").exists());

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_zero_peers_on_one_torrent_leaves_the_other_active() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/empty/announce");
            then.status(200)
                .body(b"d8:intervali1800e8:completei0e10:incompletei0ee".to_vec());
        });
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/healthy/announce");
            then.status(200)
                .body(b"d8:intervali1800e8:completei5e10:incompletei5ee".to_vec());
        });

        let root = tempdir().unwrap();
        let torrents_dir = root.path().join("torrents");
        let archived_dir = torrents_dir.join("archived");
        std::fs::create_dir_all(&archived_dir).unwrap();
        write_torrent(&torrents_dir, "empty", &format!("{}/empty/announce", server.base_url()));
        write_torrent(
            &torrents_dir,
            "healthy",
            &format!("{}/healthy/announce", server.base_url()),
        );

        let provider = Arc::new(TorrentFileProvider::new(&torrents_dir, &archived_dir));
        provider.scan_once().await;

        let config = OrchestratorConfig {
            simultaneous_seed: -1,
            keep_torrent_with_zero_leechers: false,
            archive_on_too_many_failures: false,
        };
        let orchestrator = make_orchestrator(config, provider.clone(), 6885);

        orchestrator.start().await;
        tokio::time::sleep(Duration::from_millis(1700)).await;

        let remaining = orchestrator.active_torrents().await;
        assert_eq!(1, remaining.len());
        assert_eq!(1, provider.known_info_hashes().await.len());

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_hit_and_run_breach_archives_the_torrent() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET);
            then.status(200)
                .body(b"d8:intervali1800e8:completei5e10:incompletei5ee".to_vec());
        });

        let root = tempdir().unwrap();
        let torrents_dir = root.path().join("torrents");
        let archived_dir = torrents_dir.join("archived");
        std::fs::create_dir_all(&archived_dir).unwrap();
        write_torrent(&torrents_dir, "a", &format!("{}/announce", server.base_url()));

        let provider = Arc::new(TorrentFileProvider::new(&torrents_dir, &archived_dir));
        provider.scan_once().await;
        let info_hash = provider.known_info_hashes().await[0].clone();

        let probe = Arc::new(StaticConnectionProbe::new(None, 6886));
        let accessor = Arc::new(AnnounceDataAccessor::new(client(), probe));
        let executor = Arc::new(AnnounceExecutor::new(accessor, TrackerTransport::new()));
        let delay_queue = Arc::new(DelayQueue::new());
        let bandwidth = Arc::new(BandwidthDispatcher::new(1000, 2000));
        // required_seeding_ms is unreachable and max_non_seeding_ms is zero, so
        // the very first review after going non-seeding is a breach.
        let hit_and_run = Arc::new(HitAndRunTracker::with_review_interval(
            root.path().join("elapsed-times.json"),
            u64::MAX,
            0,
            Duration::from_secs(3600),
        ));

        let config = OrchestratorConfig {
            simultaneous_seed: -1,
            keep_torrent_with_zero_leechers: true,
            archive_on_too_many_failures: false,
        };
        let orchestrator = Orchestrator::new(
            config,
            delay_queue,
            executor,
            bandwidth,
            provider.clone(),
            hit_and_run.clone(),
            -1.0,
        );

        orchestrator.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        // simulate the torrent going non-seeding and force a review pass
        // directly, rather than waiting out the tracker's own review_interval.
        hit_and_run.stop(info_hash).await;
        hit_and_run.review_once().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(archived_dir.join("a.torrent").exists());

        orchestrator.stop().await;
    }
}
