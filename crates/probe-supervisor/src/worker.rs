//! One worker process's event loop (spec §5): runs one task per assigned
//! channel concurrently, each driven by `probe_monitor::ChannelMonitor`.
//! CPU-heavy decode/analysis work is off-loaded by the monitor itself
//! onto the blocking pool; this loop only owns task lifecycles.

use probe_core::model::ChannelConfig;
use probe_monitor::{ChannelMonitor, MonitorConfig};
use probe_sinks::{HotStateSink, SqlStore, TsdbSink};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run every channel in `channels` concurrently until `cancel` fires,
/// then wait for all monitor tasks to observe cancellation and exit.
pub async fn run_worker(
    channels: Vec<ChannelConfig>,
    monitor_config: MonitorConfig,
    sql: SqlStore,
    hot_state: HotStateSink,
    tsdb: TsdbSink,
    cancel: CancellationToken,
) {
    info!(channel_count = channels.len(), "worker starting channel monitors");

    let mut tasks = JoinSet::new();
    for channel in channels {
        let monitor = ChannelMonitor::new(
            channel,
            monitor_config.clone(),
            sql.clone(),
            hot_state.clone(),
            tsdb.clone(),
        );
        let task_cancel = cancel.clone();
        tasks.spawn(monitor.run(task_cancel));
    }

    // Cancellation is cooperative (spec §5): tasks observe `cancel` inside
    // their own select loop and return; this just waits for them to drain.
    while tasks.join_next().await.is_some() {}

    info!("worker: all channel monitors exited");
}
