//! Operational knobs for the channel monitor (spec §6), env-var driven
//! with the documented defaults as fallback — mirrors the teacher's
//! `LOG_DIR`/`DATABASE_URL` `std::env::var(...).unwrap_or_else(...)` idiom
//! in `rust-srec/src/main.rs`.

use std::path::PathBuf;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Default receive deadline before a channel is considered to have gone
/// quiet (spec §4.G step 1).
pub const DEFAULT_UDP_TIMEOUT_SEC: u64 = 2;
/// Default cadence of the periodic decode step (spec §4.G step 3).
pub const DEFAULT_FRAME_SAMPLE_INTERVAL_SEC: f64 = 0.5;
/// Cap on the per-channel rolling decode buffer (spec §4.G step 2).
pub const DEFAULT_ROLLING_BUFFER_CAP: usize = 64 * 1024;
/// Minimum requested socket receive buffer (spec §4.G init).
pub const DEFAULT_SOCKET_RCVBUF: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub udp_timeout: Duration,
    pub frame_sample_interval: Duration,
    pub rolling_buffer_cap: usize,
    pub socket_rcvbuf: usize,
    pub thumbnail_dir: PathBuf,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub thumbnail_quality_latest: u8,
    pub thumbnail_quality_alarm: u8,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            udp_timeout: Duration::from_secs(env_or("UDP_TIMEOUT_SEC", DEFAULT_UDP_TIMEOUT_SEC)),
            frame_sample_interval: Duration::from_secs_f64(env_or(
                "FRAME_SAMPLE_INTERVAL_SEC",
                DEFAULT_FRAME_SAMPLE_INTERVAL_SEC,
            )),
            rolling_buffer_cap: env_or("ROLLING_BUFFER_CAP_BYTES", DEFAULT_ROLLING_BUFFER_CAP),
            socket_rcvbuf: env_or("SOCKET_RCVBUF_BYTES", DEFAULT_SOCKET_RCVBUF),
            thumbnail_dir: env_or::<String>("THUMBNAIL_DIR", "thumbnails".to_string()).into(),
            thumbnail_width: env_or("THUMBNAIL_WIDTH", 320),
            thumbnail_height: env_or("THUMBNAIL_HEIGHT", 180),
            thumbnail_quality_latest: env_or("THUMBNAIL_QUALITY", 75),
            thumbnail_quality_alarm: 85,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        // SAFETY: test-only env isolation; no other test in this crate reads these keys.
        for key in [
            "UDP_TIMEOUT_SEC",
            "FRAME_SAMPLE_INTERVAL_SEC",
            "ROLLING_BUFFER_CAP_BYTES",
            "SOCKET_RCVBUF_BYTES",
            "THUMBNAIL_DIR",
            "THUMBNAIL_WIDTH",
            "THUMBNAIL_HEIGHT",
            "THUMBNAIL_QUALITY",
        ] {
            unsafe { std::env::remove_var(key) };
        }
        let config = MonitorConfig::default();
        assert_eq!(config.udp_timeout, Duration::from_secs(DEFAULT_UDP_TIMEOUT_SEC));
        assert_eq!(config.rolling_buffer_cap, DEFAULT_ROLLING_BUFFER_CAP);
    }
}
