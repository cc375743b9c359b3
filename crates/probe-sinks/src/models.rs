//! Typed DTOs for sink payloads.
//!
//! Spec design note: the hot-state store is "everything is a string"
//! underneath (a Redis hash). Rather than pushing that dynamic typing up
//! into callers, this module is the one place that knows how to turn a
//! [`ChannelMetrics`]/[`ChannelStatus`] pair into the field map the store
//! persists, and back. Readers that hit the hash directly must still
//! tolerate absent fields (treat as zero/false/empty) — see
//! [`StatusRecord::from_fields`].

use chrono::{DateTime, Utc};
use probe_core::model::{ChannelMetrics, ChannelStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The record stored at `channel:<id>:status` (spec §4.I/§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: String,
    pub channel_name: String,
    pub bitrate_kbps: f64,
    pub is_offline: bool,
    pub is_black: bool,
    pub is_frozen: bool,
    pub is_silent: bool,
    pub is_clipping: bool,
    pub is_mosaic: bool,
    pub is_stuttering: bool,
    pub cc_errors_per_sec: f64,
    pub pcr_jitter_ms: f64,
    pub audio_rms: f64,
    pub video_brightness: f64,
    pub thumbnail_path: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn from_metrics(metrics: &ChannelMetrics, status: ChannelStatus) -> Self {
        Self {
            status: status.to_string(),
            channel_name: metrics.channel_name.clone(),
            bitrate_kbps: metrics.bitrate_kbps,
            is_offline: metrics.is_offline,
            is_black: metrics.is_black,
            is_frozen: metrics.is_frozen,
            is_silent: metrics.is_silent,
            is_clipping: metrics.is_clipping,
            is_mosaic: metrics.is_mosaic,
            is_stuttering: metrics.is_stuttering,
            cc_errors_per_sec: metrics.cc_errors_per_sec,
            pcr_jitter_ms: metrics.pcr_jitter_ms,
            audio_rms: metrics.audio_rms,
            video_brightness: metrics.video_brightness,
            thumbnail_path: metrics.thumbnail_path.clone(),
            updated_at: metrics.timestamp,
        }
    }

    /// Flatten to the `(field, value)` pairs an `HSET` writes.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("status", self.status.clone()),
            ("channel_name", self.channel_name.clone()),
            ("bitrate_kbps", self.bitrate_kbps.to_string()),
            ("is_offline", self.is_offline.to_string()),
            ("is_black", self.is_black.to_string()),
            ("is_frozen", self.is_frozen.to_string()),
            ("is_silent", self.is_silent.to_string()),
            ("is_clipping", self.is_clipping.to_string()),
            ("is_mosaic", self.is_mosaic.to_string()),
            ("is_stuttering", self.is_stuttering.to_string()),
            ("cc_errors_per_sec", self.cc_errors_per_sec.to_string()),
            ("pcr_jitter_ms", self.pcr_jitter_ms.to_string()),
            ("audio_rms", self.audio_rms.to_string()),
            ("video_brightness", self.video_brightness.to_string()),
            (
                "thumbnail_path",
                self.thumbnail_path.clone().unwrap_or_default(),
            ),
            ("updated_at", self.updated_at.to_rfc3339()),
        ]
    }

    /// Reconstruct from a raw field map, tolerating absent keys. TTL
    /// enforcement (stale => OFFLINE) is the reader's responsibility; this
    /// just parses whatever is present.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let get = |k: &str| fields.get(k).cloned().unwrap_or_default();
        let get_f64 = |k: &str| get(k).parse::<f64>().unwrap_or(0.0);
        let get_bool = |k: &str| get(k).parse::<bool>().unwrap_or(false);

        Self {
            status: fields
                .get("status")
                .cloned()
                .unwrap_or_else(|| "OFFLINE".to_string()),
            channel_name: get("channel_name"),
            bitrate_kbps: get_f64("bitrate_kbps"),
            is_offline: get_bool("is_offline"),
            is_black: get_bool("is_black"),
            is_frozen: get_bool("is_frozen"),
            is_silent: get_bool("is_silent"),
            is_clipping: get_bool("is_clipping"),
            is_mosaic: get_bool("is_mosaic"),
            is_stuttering: get_bool("is_stuttering"),
            cc_errors_per_sec: get_f64("cc_errors_per_sec"),
            pcr_jitter_ms: get_f64("pcr_jitter_ms"),
            audio_rms: get_f64("audio_rms"),
            video_brightness: get_f64("video_brightness"),
            thumbnail_path: fields.get("thumbnail_path").filter(|s| !s.is_empty()).cloned(),
            updated_at: fields
                .get("updated_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    /// Spec §8 invariant 2: a record older than the TTL reads as OFFLINE
    /// regardless of its stored `status`.
    pub fn effective_status(&self, now: DateTime<Utc>, ttl_secs: i64) -> String {
        if (now - self.updated_at).num_seconds() > ttl_secs {
            "OFFLINE".to_string()
        } else {
            self.status.clone()
        }
    }
}

/// The `metrics_update` pub/sub payload (spec §6): JSON mirroring the hot
/// state fields plus identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsUpdateEvent {
    pub channel_id: String,
    #[serde(flatten)]
    pub record: StatusRecord,
}

/// The `alert_update` pub/sub payload (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertUpdateEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub alert_id: i64,
    pub channel_id: String,
    pub channel_name: String,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub ts: DateTime<Utc>,
}
