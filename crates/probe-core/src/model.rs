//! Shared data model for the probe pipeline: channel configuration, the
//! per-second metrics snapshot, channel/alert status, and alert records.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// Immutable per-run channel configuration, loaded once by the supervisor
/// from the SQL store and handed to each monitor task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Opaque, unique channel identifier.
    pub id: String,
    pub display_name: String,
    /// Multicast group address, expected in 224.0.0.0/4.
    pub multicast_group: Ipv4Addr,
    pub port: u16,
    pub group_tag: String,
    pub sort_order: i32,
    pub enabled: bool,
    /// 0 means "unknown" / not checked by the bitrate-anomaly predicate.
    pub expected_bitrate_kbps: f64,
}

impl ChannelConfig {
    /// True when `multicast_group` falls in the IPv4 multicast range.
    pub fn has_valid_multicast_group(&self) -> bool {
        self.multicast_group.octets()[0] & 0xF0 == 0xE0
    }
}

/// A single per-channel, per-second metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMetrics {
    pub channel_id: String,
    pub channel_name: String,
    pub is_offline: bool,
    pub is_black: bool,
    pub is_frozen: bool,
    pub is_silent: bool,
    pub is_clipping: bool,
    pub is_mosaic: bool,
    pub mosaic_ratio: f64,
    pub is_stuttering: bool,
    pub stutter_count: u32,
    pub cc_errors_per_sec: f64,
    pub pcr_jitter_ms: f64,
    pub bitrate_kbps: f64,
    pub expected_bitrate_kbps: f64,
    pub audio_rms: f64,
    /// Mean luma in [0, 255].
    pub video_brightness: f64,
    pub thumbnail_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChannelMetrics {
    /// A metrics snapshot representing a channel with no recent datagrams.
    pub fn offline(channel_id: impl Into<String>, channel_name: impl Into<String>, expected_bitrate_kbps: f64) -> Self {
        Self {
            channel_id: channel_id.into(),
            channel_name: channel_name.into(),
            is_offline: true,
            is_black: false,
            is_frozen: false,
            is_silent: false,
            is_clipping: false,
            is_mosaic: false,
            mosaic_ratio: 0.0,
            is_stuttering: false,
            stutter_count: 0,
            cc_errors_per_sec: 0.0,
            pcr_jitter_ms: 0.0,
            bitrate_kbps: 0.0,
            expected_bitrate_kbps,
            audio_rms: 0.0,
            video_brightness: 0.0,
            thumbnail_path: None,
            timestamp: Utc::now(),
        }
    }
}

/// Overall channel health as derived by the status evaluator (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Normal,
    Warning,
    Alarm,
    Offline,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelStatus::Normal => "NORMAL",
            ChannelStatus::Warning => "WARNING",
            ChannelStatus::Alarm => "ALARM",
            ChannelStatus::Offline => "OFFLINE",
        };
        f.write_str(s)
    }
}

/// Alert severity; fixed per `AlertKind` (see `AlertKind::severity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Critical,
    Warning,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Critical => "CRITICAL",
            AlertSeverity::Warning => "WARNING",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of an alert row in the SQL store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Resolved => "RESOLVED",
        };
        f.write_str(s)
    }
}

/// One of the fault kinds the status evaluator can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    BlackScreen,
    Frozen,
    Silent,
    Clipping,
    CcError,
    PcrJitter,
    BitrateAbnormal,
    Mosaic,
    AudioStutter,
    Offline,
}

impl AlertKind {
    /// Fixed severity table (§3): the three video/audio loss conditions and
    /// OFFLINE are CRITICAL, everything else is WARNING.
    pub fn severity(self) -> AlertSeverity {
        match self {
            AlertKind::BlackScreen
            | AlertKind::Frozen
            | AlertKind::Silent
            | AlertKind::Offline => AlertSeverity::Critical,
            AlertKind::Clipping
            | AlertKind::CcError
            | AlertKind::PcrJitter
            | AlertKind::BitrateAbnormal
            | AlertKind::Mosaic
            | AlertKind::AudioStutter => AlertSeverity::Warning,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::BlackScreen => "BLACK_SCREEN",
            AlertKind::Frozen => "FROZEN",
            AlertKind::Silent => "SILENT",
            AlertKind::Clipping => "CLIPPING",
            AlertKind::CcError => "CC_ERROR",
            AlertKind::PcrJitter => "PCR_JITTER",
            AlertKind::BitrateAbnormal => "BITRATE_ABNORMAL",
            AlertKind::Mosaic => "MOSAIC",
            AlertKind::AudioStutter => "AUDIO_STUTTER",
            AlertKind::Offline => "OFFLINE",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "BLACK_SCREEN" => Ok(AlertKind::BlackScreen),
            "FROZEN" => Ok(AlertKind::Frozen),
            "SILENT" => Ok(AlertKind::Silent),
            "CLIPPING" => Ok(AlertKind::Clipping),
            "CC_ERROR" => Ok(AlertKind::CcError),
            "PCR_JITTER" => Ok(AlertKind::PcrJitter),
            "BITRATE_ABNORMAL" => Ok(AlertKind::BitrateAbnormal),
            "MOSAIC" => Ok(AlertKind::Mosaic),
            "AUDIO_STUTTER" => Ok(AlertKind::AudioStutter),
            "OFFLINE" => Ok(AlertKind::Offline),
            other => Err(ProbeError::InvalidConfig(format!("unknown alert_type: {other}"))),
        }
    }
}

/// An alert row as persisted in the SQL store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// `None` before the row has been assigned an auto id by the store.
    pub id: Option<i64>,
    pub channel_id: String,
    /// Channel name snapshot at alert creation time.
    pub channel_name: String,
    pub alert_type: AlertKind,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub ack_at: Option<DateTime<Utc>>,
    pub thumbnail_path: Option<String>,
}

impl Alert {
    pub fn new_active(channel_id: impl Into<String>, channel_name: impl Into<String>, alert_type: AlertKind) -> Self {
        Self {
            id: None,
            channel_id: channel_id.into(),
            channel_name: channel_name.into(),
            alert_type,
            severity: alert_type.severity(),
            status: AlertStatus::Active,
            message: None,
            started_at: Utc::now(),
            resolved_at: None,
            ack_at: None,
            thumbnail_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_table_matches_spec() {
        assert_eq!(AlertKind::BlackScreen.severity(), AlertSeverity::Critical);
        assert_eq!(AlertKind::Frozen.severity(), AlertSeverity::Critical);
        assert_eq!(AlertKind::Silent.severity(), AlertSeverity::Critical);
        assert_eq!(AlertKind::Offline.severity(), AlertSeverity::Critical);
        assert_eq!(AlertKind::Clipping.severity(), AlertSeverity::Warning);
        assert_eq!(AlertKind::CcError.severity(), AlertSeverity::Warning);
        assert_eq!(AlertKind::PcrJitter.severity(), AlertSeverity::Warning);
        assert_eq!(AlertKind::BitrateAbnormal.severity(), AlertSeverity::Warning);
        assert_eq!(AlertKind::Mosaic.severity(), AlertSeverity::Warning);
        assert_eq!(AlertKind::AudioStutter.severity(), AlertSeverity::Warning);
    }

    #[test]
    fn alert_kind_display_matches_wire_names() {
        assert_eq!(AlertKind::BlackScreen.to_string(), "BLACK_SCREEN");
        assert_eq!(AlertKind::BitrateAbnormal.to_string(), "BITRATE_ABNORMAL");
    }

    #[test]
    fn alert_kind_round_trips_through_display_and_from_str() {
        for kind in [
            AlertKind::BlackScreen,
            AlertKind::Frozen,
            AlertKind::Silent,
            AlertKind::Clipping,
            AlertKind::CcError,
            AlertKind::PcrJitter,
            AlertKind::BitrateAbnormal,
            AlertKind::Mosaic,
            AlertKind::AudioStutter,
            AlertKind::Offline,
        ] {
            let parsed: AlertKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("NOT_A_KIND".parse::<AlertKind>().is_err());
    }

    #[test]
    fn multicast_group_validation() {
        let mut config = ChannelConfig {
            id: "ch1".into(),
            display_name: "Channel 1".into(),
            multicast_group: "239.1.1.1".parse().unwrap(),
            port: 1234,
            group_tag: "default".into(),
            sort_order: 0,
            enabled: true,
            expected_bitrate_kbps: 0.0,
        };
        assert!(config.has_valid_multicast_group());
        config.multicast_group = "10.0.0.1".parse().unwrap();
        assert!(!config.has_valid_multicast_group());
    }
}
