//! Logging initialization (spec SPEC_FULL.md §3): `tracing` + daily
//! rolling file appender, modeled on the teacher's
//! `rust-srec/src/logging/mod.rs` minus the reload-handle/broadcast
//! machinery — this core has no dashboard consumer to stream logs to.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive (spec SPEC_FULL.md §3).
pub const DEFAULT_LOG_FILTER: &str = "probe_daemon=info,probe_monitor=info,probe_supervisor=info,sqlx=warn";

/// Initialize a stdout layer plus a daily-rolling file layer under
/// `log_dir`. The returned [`WorkerGuard`] must be kept alive for the
/// process lifetime or the non-blocking file writer stops flushing.
pub fn init_logging(log_dir: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "probe-daemon.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let stdout_layer = fmt::layer().with_target(true);
    let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(guard)
}
