//! OS-process supervision (spec §4.J/§5): one worker process per channel
//! shard, liveness polling every 30s, restart-on-death with the same
//! channel chunk. Child spawning follows the teacher's
//! `downloader/engine/ffmpeg.rs` `tokio::process::Command` idiom, routed
//! through `process-utils` for the `CREATE_NO_WINDOW` treatment on
//! Windows.

use std::time::Duration;

use probe_core::model::ChannelConfig;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Liveness poll cadence (spec §4.J).
pub const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Shutdown join timeout before a worker is force-killed.
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// One supervised worker process: its assigned channel ids (so it can be
/// restarted with the identical shard) and the live child handle.
struct SupervisedWorker {
    shard_index: usize,
    channel_ids: Vec<String>,
    child: Child,
}

/// Spawns `<binary> worker --channel-ids <comma-separated ids>` for each
/// shard and restarts any that exit.
pub struct ProcessSupervisor {
    binary_path: String,
    workers: Vec<SupervisedWorker>,
}

impl ProcessSupervisor {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            workers: Vec::new(),
        }
    }

    /// Spawn one worker process per shard.
    pub fn spawn_all(&mut self, shards: &[Vec<ChannelConfig>]) -> std::io::Result<()> {
        for (index, shard) in shards.iter().enumerate() {
            let ids: Vec<String> = shard.iter().map(|c| c.id.clone()).collect();
            let child = spawn_worker(&self.binary_path, index, &ids)?;
            info!(shard_index = index, channel_count = ids.len(), "worker spawned");
            self.workers.push(SupervisedWorker {
                shard_index: index,
                channel_ids: ids,
                child,
            });
        }
        Ok(())
    }

    /// Poll liveness every [`LIVENESS_POLL_INTERVAL`], restarting dead
    /// workers with their original channel chunk, until `cancel` fires.
    pub async fn supervise(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(LIVENESS_POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.shutdown().await;
                    break;
                }
                _ = interval.tick() => {
                    self.check_liveness();
                }
            }
        }
    }

    fn check_liveness(&mut self) {
        for worker in &mut self.workers {
            match worker.child.try_wait() {
                Ok(Some(status)) => {
                    warn!(shard_index = worker.shard_index, %status, "worker exited, restarting");
                    match spawn_worker(&self.binary_path, worker.shard_index, &worker.channel_ids) {
                        Ok(child) => worker.child = child,
                        Err(err) => {
                            error!(shard_index = worker.shard_index, error = %err, "failed to restart worker");
                        }
                    }
                }
                Ok(None) => {} // still running
                Err(err) => {
                    error!(shard_index = worker.shard_index, error = %err, "liveness check failed");
                }
            }
        }
    }

    /// Terminate every worker and join with a timeout; anything still
    /// alive past the timeout is killed outright (spec §5 cancellation).
    async fn shutdown(&mut self) {
        for worker in &mut self.workers {
            let _ = worker.child.start_kill();
        }
        for worker in &mut self.workers {
            let wait = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, worker.child.wait()).await;
            if wait.is_err() {
                warn!(shard_index = worker.shard_index, "worker did not exit in time, killing");
                let _ = worker.child.start_kill();
            }
        }
    }
}

fn spawn_worker(binary_path: &str, shard_index: usize, channel_ids: &[String]) -> std::io::Result<Child> {
    let mut cmd = process_utils::tokio_command(binary_path);
    cmd.arg("worker")
        .arg("--shard-index")
        .arg(shard_index.to_string())
        .arg("--channel-ids")
        .arg(channel_ids.join(","))
        .kill_on_drop(true);
    cmd.spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_interval_matches_spec() {
        assert_eq!(LIVENESS_POLL_INTERVAL, Duration::from_secs(30));
    }
}
