//! probe-daemon: bootstraps the IPTV QoS probe (spec §4.J, SPEC_FULL.md
//! §2) — `supervisor` loads channels and shards them across worker
//! processes; `worker` runs one shard's channel monitors. Both share the
//! same binary (teacher's single-binary, subcommand-per-role pattern).

mod config;
mod logging;

use clap::{Parser, Subcommand};
use probe_monitor::MonitorConfig;
use probe_sinks::{init_pool, run_migrations, HotStateSink, SqlStore, TsdbSink};
use probe_supervisor::{partition, resolve_chunk_size, run_worker, ProcessSupervisor};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "probe-daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load enabled channels, shard them, and supervise one worker process
    /// per shard (spec §4.J). This is the default when no subcommand is given.
    Supervisor,
    /// Run the channel monitors for one shard in this process (spec §5).
    Worker {
        #[arg(long)]
        shard_index: usize,
        #[arg(long, value_delimiter = ',')]
        channel_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let _guard = logging::init_logging(&log_dir)?;

    let cli = Cli::parse();
    let config = DaemonConfig::from_env();

    match cli.command.unwrap_or(Command::Supervisor) {
        Command::Supervisor => run_supervisor(config).await,
        Command::Worker {
            shard_index,
            channel_ids,
        } => run_worker_process(config, shard_index, channel_ids).await,
    }
}

async fn run_supervisor(config: DaemonConfig) -> anyhow::Result<()> {
    info!("probe-daemon supervisor starting, v{}", env!("CARGO_PKG_VERSION"));

    let pool = init_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    info!("sql schema ready");

    let sql = SqlStore::new(pool);
    let swept = sql.sweep_alerts_for_disabled_channels().await?;
    if swept > 0 {
        info!(swept, "resolved ACTIVE alerts for disabled/removed channels at startup");
    }

    let channels = sql.load_enabled_channels().await?;
    info!(channel_count = channels.len(), "loaded enabled channels");

    let chunk_size = resolve_chunk_size(channels.len(), config.worker_count, config.channels_per_worker);
    let shards = partition(channels, chunk_size);
    info!(shard_count = shards.len(), chunk_size, "sharded channels across workers");

    let mut supervisor = ProcessSupervisor::new(config.binary_path.clone());
    supervisor.spawn_all(&shards)?;

    let cancel = CancellationToken::new();
    let supervisor_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        supervisor_cancel.cancel();
    });

    supervisor.supervise(cancel).await;
    info!("probe-daemon supervisor shut down");
    Ok(())
}

async fn run_worker_process(
    config: DaemonConfig,
    shard_index: usize,
    channel_ids: Vec<String>,
) -> anyhow::Result<()> {
    info!(shard_index, channel_count = channel_ids.len(), "probe-daemon worker starting");

    let pool = init_pool(&config.database_url).await?;
    let sql = SqlStore::new(pool);
    let channels: Vec<_> = sql
        .load_enabled_channels()
        .await?
        .into_iter()
        .filter(|c| channel_ids.contains(&c.id))
        .collect();

    if channels.len() != channel_ids.len() {
        warn!(
            expected = channel_ids.len(),
            found = channels.len(),
            "some assigned channels were not found or are disabled; continuing with what's available"
        );
    }

    let hot_state = match HotStateSink::connect(&config.redis_url).await {
        Ok(sink) => sink,
        Err(err) => {
            error!(error = %err, "hot-state sink unavailable, worker cannot start");
            return Err(err.into());
        }
    };
    let tsdb = TsdbSink::new(config.tsdb.clone());
    let monitor_config = MonitorConfig::default();

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        worker_cancel.cancel();
    });

    run_worker(channels, monitor_config, sql, hot_state, tsdb, cancel).await;
    info!(shard_index, "probe-daemon worker shut down");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, shutting down");
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
