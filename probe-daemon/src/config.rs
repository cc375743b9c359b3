//! Daemon-level env-var configuration (spec §6): storage endpoints and
//! the operational knobs the supervisor needs before it can construct the
//! sink clients and shard channels. Mirrors the teacher's
//! `std::env::var(...).unwrap_or_else(...)` idiom in `rust-srec/src/main.rs`.

use probe_sinks::TsdbConfig;
use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Storage endpoints and shard sizing read once at startup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub database_url: String,
    pub redis_url: String,
    pub tsdb: TsdbConfig,
    pub worker_count: Option<usize>,
    pub channels_per_worker: usize,
    pub binary_path: String,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_string("DATABASE_URL", "sqlite:probe.db?mode=rwc"),
            redis_url: env_string("REDIS_URL", "redis://127.0.0.1:6379"),
            tsdb: TsdbConfig {
                url: env_string("TSDB_URL", "http://127.0.0.1:8086"),
                token: env_string("TSDB_TOKEN", ""),
                org: env_string("TSDB_ORG", "probe"),
                bucket: env_string("TSDB_BUCKET", "channel_metrics"),
                batch_size: env_parsed("INFLUX_BATCH_SIZE", 500),
                flush_interval: Duration::from_millis(env_parsed(
                    "INFLUX_FLUSH_INTERVAL_MS",
                    5_000,
                )),
            },
            worker_count: std::env::var("WORKER_COUNT").ok().and_then(|v| v.parse().ok()),
            channels_per_worker: env_parsed(
                "CHANNELS_PER_WORKER",
                probe_supervisor::DEFAULT_CHANNELS_PER_WORKER,
            ),
            binary_path: std::env::current_exe()
                .ok()
                .and_then(|p| p.to_str().map(str::to_string))
                .unwrap_or_else(|| "probe-daemon".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_unset() {
        for key in [
            "DATABASE_URL",
            "REDIS_URL",
            "TSDB_URL",
            "TSDB_TOKEN",
            "TSDB_ORG",
            "TSDB_BUCKET",
            "INFLUX_BATCH_SIZE",
            "INFLUX_FLUSH_INTERVAL_MS",
            "WORKER_COUNT",
            "CHANNELS_PER_WORKER",
        ] {
            unsafe { std::env::remove_var(key) };
        }
        let config = DaemonConfig::from_env();
        assert_eq!(config.tsdb.batch_size, 500);
        assert!(config.worker_count.is_none());
        assert_eq!(config.channels_per_worker, probe_supervisor::DEFAULT_CHANNELS_PER_WORKER);
    }
}
