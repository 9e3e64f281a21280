use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::trace;
use tokio::sync::{Notify, Semaphore};

use crate::announce::accessor::AnnounceDataAccessor;
use crate::announce::announcer::Announcer;
use crate::announce::request::AnnounceEvent;
use crate::tracker::errors::Result as TrackerResult;
use crate::tracker::response::AnnounceResponse;
use crate::tracker::transport::TrackerTransport;

const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Receives the outcome of a single announce attempt: the fixed
/// response handler chain implements this and is invoked on the calling
/// worker, never on the scheduler loop.
#[async_trait]
pub trait AnnounceOutcomeSink: Send + Sync {
    async fn handle(
        &self,
        announcer: Arc<Announcer>,
        event: AnnounceEvent,
        outcome: TrackerResult<AnnounceResponse>,
    );
}

/// The bounded concurrent HTTP worker: accepts announce requests,
/// builds and sends the HTTP GET via the data accessor and transport, and
/// routes the outcome through an [`AnnounceOutcomeSink`] on the worker task.
#[derive(Clone)]
pub struct AnnounceExecutor {
    accessor: Arc<AnnounceDataAccessor>,
    transport: TrackerTransport,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl AnnounceExecutor {
    pub fn new(accessor: Arc<AnnounceDataAccessor>, transport: TrackerTransport) -> Self {
        Self::with_pool_size(accessor, transport, DEFAULT_WORKER_POOL_SIZE)
    }

    pub fn with_pool_size(
        accessor: Arc<AnnounceDataAccessor>,
        transport: TrackerTransport,
        pool_size: usize,
    ) -> Self {
        Self {
            accessor,
            transport,
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Submit an announce for execution. Non-blocking: the call returns
    /// once the task has been spawned, whether or not a worker slot is
    /// immediately available (the semaphore queues excess submissions).
    pub fn submit(
        &self,
        announcer: Arc<Announcer>,
        event: AnnounceEvent,
        sink: Arc<dyn AnnounceOutcomeSink>,
    ) {
        let accessor = self.accessor.clone();
        let transport = self.transport.clone();
        let semaphore = self.semaphore.clone();
        let in_flight = self.in_flight.clone();
        let drained = self.drained.clone();

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            trace!("Executing announce {:?} for {}", event, announcer);

            let outcome = match accessor.build_url(&announcer, event).await {
                Ok(url) => {
                    let headers = accessor.build_headers();
                    transport.announce(url, headers).await
                }
                Err(e) => Err(e),
            };

            sink.handle(announcer, event, outcome).await;

            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
        });
    }

    /// Block until every submitted task has completed (used on shutdown,
    /// the shutdown sequence).
    pub async fn await_running_tasks(&self) {
        loop {
            // Register for the next notification before re-checking the
            // count: if a worker drains to zero and calls notify_waiters()
            // between the load and the await below, a notified() created
            // only after that point would miss it and hang forever.
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{EmulatedClient, KeyRefreshPolicy};
    use crate::connection::StaticConnectionProbe;
    use crate::torrent::{InfoHash, TorrentMetadata};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify as TokioNotify;
    use url::Url;

    struct RecordingSink {
        results: StdMutex<Vec<bool>>,
        notify: TokioNotify,
    }

    #[async_trait]
    impl AnnounceOutcomeSink for RecordingSink {
        async fn handle(
            &self,
            _announcer: Arc<Announcer>,
            _event: AnnounceEvent,
            outcome: TrackerResult<AnnounceResponse>,
        ) {
            self.results.lock().unwrap().push(outcome.is_ok());
            self.notify.notify_waiters();
        }
    }

    fn test_executor(pool_size: usize) -> AnnounceExecutor {
        let client = EmulatedClient {
            name: "test".to_string(),
            peer_id_prefix: "-gS0010-".to_string(),
            user_agent: "GhostSeed/0.1".to_string(),
            accept_encoding: "gzip".to_string(),
            connection: "close".to_string(),
            numwant: 200,
            numwant_on_stop: 0,
            key_refresh: KeyRefreshPolicy::PerTorrent,
        };
        let probe = Arc::new(StaticConnectionProbe::new(None, 6881));
        let accessor = Arc::new(AnnounceDataAccessor::new(client, probe));
        AnnounceExecutor::with_pool_size(accessor, TrackerTransport::new(), pool_size)
    }

    fn test_announcer(tracker_url: &str) -> Arc<Announcer> {
        Arc::new(Announcer::new(TorrentMetadata {
            info_hash: InfoHash::from_info_dict(b"executor-test"),
            name: "test.iso".to_string(),
            total_size: 1000,
            trackers: vec![vec![Url::parse(tracker_url).unwrap()]],
        }))
    }

    #[tokio::test]
    async fn test_submit_reports_outcome_through_sink() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/announce");
            then.status(200)
                .body(b"d8:intervali1800e8:completei1e10:incompletei1ee".to_vec());
        });

        let executor = test_executor(2);
        let announcer = test_announcer(&format!("{}/announce", server.base_url()));
        let sink = Arc::new(RecordingSink {
            results: StdMutex::new(vec![]),
            notify: TokioNotify::new(),
        });

        executor.submit(announcer, AnnounceEvent::Started, sink.clone());

        tokio::time::timeout(std::time::Duration::from_secs(2), sink.notify.notified())
            .await
            .unwrap();
        mock.assert();
        assert_eq!(vec![true], *sink.results.lock().unwrap());
    }

    #[tokio::test]
    async fn test_await_running_tasks_drains() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/announce");
            then.status(200)
                .body(b"d8:intervali1800e8:completei1e10:incompletei1ee".to_vec());
        });

        let executor = test_executor(2);
        let announcer = test_announcer(&format!("{}/announce", server.base_url()));
        let sink = Arc::new(RecordingSink {
            results: StdMutex::new(vec![]),
            notify: TokioNotify::new(),
        });

        executor.submit(announcer, AnnounceEvent::Started, sink);
        executor.await_running_tasks().await;

        assert_eq!(0, executor.in_flight_count());
    }
}
