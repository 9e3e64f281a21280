use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, LevelFilter};
use tokio_util::sync::CancellationToken;

use ghost_seed::announce::{AnnounceDataAccessor, AnnounceExecutor, DelayQueue};
use ghost_seed::bandwidth::BandwidthDispatcher;
use ghost_seed::client::EmulatedClient;
use ghost_seed::config;
use ghost_seed::connection::StaticConnectionProbe;
use ghost_seed::hitandrun::HitAndRunTracker;
use ghost_seed::logging;
use ghost_seed::orchestrator::{Orchestrator, OrchestratorConfig};
use ghost_seed::provider::TorrentFileProvider;
use ghost_seed::tracker::TrackerTransport;

/// A BitTorrent seed emulator: keeps trackers convinced a host is seeding a
/// set of torrents without moving any real piece data.
#[derive(Parser, Debug)]
#[command(name = "ghost-seed", version, about)]
struct Cli {
    /// Directory holding config.json, torrents/, and clients/.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Log verbosity.
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// The port advertised to trackers as this instance's listening port.
    #[arg(long, default_value_t = 6881)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_level) {
        eprintln!("failed to initialize logger, {}", e);
    }

    if let Err(e) = run(cli).await {
        error!("ghost-seed exited with an error, {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let (config, layout) = config::load(&cli.root)?;
    info!("Loaded configuration from {}", layout);

    let client = EmulatedClient::load(layout.clients_dir(), &config.client)?;
    let probe = Arc::new(StaticConnectionProbe::new(None, cli.port));
    let accessor = Arc::new(AnnounceDataAccessor::new(client, probe.clone()));
    let transport = TrackerTransport::new();
    let executor = Arc::new(AnnounceExecutor::new(accessor, transport));
    let delay_queue = Arc::new(DelayQueue::new());

    let bandwidth = Arc::new(BandwidthDispatcher::new(config.min_upload_rate, config.max_upload_rate));
    let provider = Arc::new(TorrentFileProvider::new(
        layout.torrents_dir(),
        layout.archived_dir(),
    ));
    let hit_and_run = Arc::new(HitAndRunTracker::new(
        layout.elapsed_times_file(),
        config.required_seeding_time_ms,
        config.max_non_seeding_time_ms,
    ));

    let orchestrator_config = OrchestratorConfig {
        simultaneous_seed: config.simultaneous_seed,
        keep_torrent_with_zero_leechers: config.keep_torrent_with_zero_leechers,
        archive_on_too_many_failures: config.archive_on_too_many_failures,
    };
    let orchestrator = Orchestrator::new(
        orchestrator_config,
        delay_queue,
        executor,
        bandwidth.clone(),
        provider.clone(),
        hit_and_run.clone(),
        config.upload_ratio_target,
    );

    let background_token = CancellationToken::new();
    probe.spawn_refresh_loop(background_token.clone());

    let bandwidth_loop = tokio::spawn({
        let bandwidth = bandwidth.clone();
        let token = background_token.clone();
        async move { bandwidth.run(token).await }
    });
    let provider_loop = tokio::spawn({
        let provider = provider.clone();
        let token = background_token.clone();
        async move { provider.run(token).await }
    });
    let hit_and_run_loop = tokio::spawn({
        let hit_and_run = hit_and_run.clone();
        let token = background_token.clone();
        async move { hit_and_run.run(token).await }
    });

    orchestrator.start().await;
    info!("ghost-seed is running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    orchestrator.stop().await;
    background_token.cancel();
    let _ = tokio::join!(bandwidth_loop, provider_loop, hit_and_run_loop);

    Ok(())
}
