//! Pure status evaluator (spec §4.F): `ChannelMetrics -> (ChannelStatus, Vec<AlertKind>)`.

use probe_core::model::{AlertKind, ChannelMetrics, ChannelStatus};

/// CC error rate above which the WARNING predicate fires.
pub const CC_ERROR_RATE_THRESHOLD: f64 = 5.0;
/// PCR jitter, in milliseconds, above which the WARNING predicate fires.
pub const PCR_JITTER_THRESHOLD_MS: f64 = 40.0;
/// Relative bitrate deviation from `expected_bitrate_kbps` above which the
/// WARNING predicate fires.
pub const BITRATE_DEVIATION_THRESHOLD: f64 = 0.3;

/// Evaluate one `ChannelMetrics` snapshot into a status and the alert kinds
/// whose predicates are currently true. OFFLINE suppresses all other kinds.
pub fn evaluate(metrics: &ChannelMetrics) -> (ChannelStatus, Vec<AlertKind>) {
    if metrics.is_offline {
        return (ChannelStatus::Offline, vec![AlertKind::Offline]);
    }

    let mut kinds = Vec::new();
    if metrics.is_black {
        kinds.push(AlertKind::BlackScreen);
    }
    if metrics.is_frozen {
        kinds.push(AlertKind::Frozen);
    }
    if metrics.is_silent {
        kinds.push(AlertKind::Silent);
    }

    let critical = metrics.is_black || metrics.is_frozen || metrics.is_silent;

    let bitrate_abnormal = metrics.expected_bitrate_kbps > 0.0
        && ((metrics.bitrate_kbps - metrics.expected_bitrate_kbps).abs()
            / metrics.expected_bitrate_kbps)
            > BITRATE_DEVIATION_THRESHOLD;
    let cc_abnormal = metrics.cc_errors_per_sec > CC_ERROR_RATE_THRESHOLD;
    let pcr_abnormal = metrics.pcr_jitter_ms > PCR_JITTER_THRESHOLD_MS;

    if metrics.is_clipping {
        kinds.push(AlertKind::Clipping);
    }
    if cc_abnormal {
        kinds.push(AlertKind::CcError);
    }
    if pcr_abnormal {
        kinds.push(AlertKind::PcrJitter);
    }
    if bitrate_abnormal {
        kinds.push(AlertKind::BitrateAbnormal);
    }
    if metrics.is_mosaic {
        kinds.push(AlertKind::Mosaic);
    }
    if metrics.is_stuttering {
        kinds.push(AlertKind::AudioStutter);
    }

    let warning = metrics.is_clipping
        || cc_abnormal
        || pcr_abnormal
        || bitrate_abnormal
        || metrics.is_mosaic
        || metrics.is_stuttering;

    let status = if critical {
        ChannelStatus::Alarm
    } else if warning {
        ChannelStatus::Warning
    } else {
        ChannelStatus::Normal
    };

    (status, kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base_metrics() -> ChannelMetrics {
        ChannelMetrics {
            channel_id: "ch1".into(),
            channel_name: "Channel 1".into(),
            is_offline: false,
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
            bitrate_kbps: 4000.0,
            expected_bitrate_kbps: 0.0,
            audio_rms: 0.1,
            video_brightness: 100.0,
            thumbnail_path: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn normal_when_nothing_wrong() {
        let (status, kinds) = evaluate(&base_metrics());
        assert_eq!(status, ChannelStatus::Normal);
        assert!(kinds.is_empty());
    }

    #[test]
    fn offline_suppresses_everything_else() {
        let mut metrics = base_metrics();
        metrics.is_offline = true;
        metrics.is_black = true;
        metrics.is_clipping = true;
        let (status, kinds) = evaluate(&metrics);
        assert_eq!(status, ChannelStatus::Offline);
        assert_eq!(kinds, vec![AlertKind::Offline]);
    }

    #[test]
    fn black_or_frozen_or_silent_is_alarm() {
        let mut metrics = base_metrics();
        metrics.is_black = true;
        let (status, kinds) = evaluate(&metrics);
        assert_eq!(status, ChannelStatus::Alarm);
        assert!(kinds.contains(&AlertKind::BlackScreen));
    }

    #[test]
    fn bitrate_anomaly_is_warning() {
        let mut metrics = base_metrics();
        metrics.expected_bitrate_kbps = 5000.0;
        metrics.bitrate_kbps = 2000.0;
        let (status, kinds) = evaluate(&metrics);
        assert_eq!(status, ChannelStatus::Warning);
        assert!(kinds.contains(&AlertKind::BitrateAbnormal));
    }

    #[test]
    fn cc_error_burst_is_warning() {
        let mut metrics = base_metrics();
        metrics.cc_errors_per_sec = 10.0;
        let (status, kinds) = evaluate(&metrics);
        assert_eq!(status, ChannelStatus::Warning);
        assert!(kinds.contains(&AlertKind::CcError));
    }
}
