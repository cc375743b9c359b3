//! Audio analyzer: RMS, clipping, silence and stutter detection (spec §4.E).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sample magnitude at or above which a sample counts as clipped.
pub const CLIP_THRESHOLD: f32 = 0.989;
/// Fraction of clipped samples above which `is_clipping` fires.
pub const CLIP_RATIO_THRESHOLD: f64 = 0.01;
/// RMS below which audio is considered silent.
pub const SILENCE_RMS_THRESHOLD: f64 = 0.01;
/// Seconds silence must persist before `is_silent` fires.
pub const SILENCE_DURATION_SEC: f64 = 5.0;
/// Multiple of the expected PTS advance that counts as an excessive gap.
pub const STUTTER_PTS_RATIO: f64 = 3.0;
/// Sliding window, in seconds, over which stutter events are counted.
pub const STUTTER_WINDOW_SEC: f64 = 10.0;
/// Stutter events within the window at or above this count trigger `is_stuttering`.
pub const STUTTER_RATE_THRESHOLD: u32 = 3;

const EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
pub struct AudioThresholds {
    pub clip_threshold: f32,
    pub clip_ratio_threshold: f64,
    pub silence_rms_threshold: f64,
    pub silence_duration_sec: f64,
    pub stutter_pts_ratio: f64,
    pub stutter_window_sec: f64,
    pub stutter_rate_threshold: u32,
}

impl Default for AudioThresholds {
    fn default() -> Self {
        Self {
            clip_threshold: CLIP_THRESHOLD,
            clip_ratio_threshold: CLIP_RATIO_THRESHOLD,
            silence_rms_threshold: SILENCE_RMS_THRESHOLD,
            silence_duration_sec: SILENCE_DURATION_SEC,
            stutter_pts_ratio: STUTTER_PTS_RATIO,
            stutter_window_sec: STUTTER_WINDOW_SEC,
            stutter_rate_threshold: STUTTER_RATE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioAnalysis {
    pub rms: f64,
    pub clip_ratio: f64,
    pub is_clipping: bool,
    pub is_silent: bool,
    pub stutter_event: bool,
    pub stutter_count: u32,
    pub is_stuttering: bool,
}

/// Hysteresis-driven per-channel audio analyzer.
pub struct AudioAnalyzer {
    thresholds: AudioThresholds,
    silence_start: Option<f64>,
    last_pts: Option<f64>,
    stutter_events: VecDeque<Instant>,
}

impl AudioAnalyzer {
    pub fn new(thresholds: AudioThresholds) -> Self {
        Self {
            thresholds,
            silence_start: None,
            last_pts: None,
            stutter_events: VecDeque::new(),
        }
    }

    /// Analyze one audio chunk.
    ///
    /// `samples` are mono float32 in `[-1.0, 1.0]` (normalize int16 by
    /// `1/32768` before calling). `ts` is wall-clock receive time, `pts` is
    /// the chunk's decoded presentation timestamp in seconds, `sample_rate`
    /// and `sample_count` describe the chunk.
    pub fn analyze(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        sample_count: usize,
        ts: Instant,
        ts_secs: f64,
        pts: f64,
    ) -> AudioAnalysis {
        let rms = compute_rms(samples);
        let clip_ratio = if samples.is_empty() {
            0.0
        } else {
            samples
                .iter()
                .filter(|&&s| s.abs() >= self.thresholds.clip_threshold)
                .count() as f64
                / samples.len() as f64
        };
        let is_clipping = clip_ratio > self.thresholds.clip_ratio_threshold;

        let loud = rms >= self.thresholds.silence_rms_threshold;
        if loud {
            self.silence_start = None;
        } else {
            self.silence_start.get_or_insert(ts_secs);
        }
        let is_silent = self
            .silence_start
            .is_some_and(|start| ts_secs - start > self.thresholds.silence_duration_sec);

        let expected_advance = sample_count as f64 / sample_rate.max(1) as f64;
        let stutter_event = match self.last_pts {
            Some(last_pts) => {
                let delta = pts - last_pts;
                delta < 0.0 || delta > expected_advance * self.thresholds.stutter_pts_ratio
            }
            None => false,
        };
        self.last_pts = Some(pts);

        if stutter_event {
            self.stutter_events.push_back(ts);
        }
        let window = Duration::from_secs_f64(self.thresholds.stutter_window_sec);
        while let Some(&front) = self.stutter_events.front() {
            if ts.duration_since(front) > window {
                self.stutter_events.pop_front();
            } else {
                break;
            }
        }
        let stutter_count = self.stutter_events.len() as u32;
        let is_stuttering = stutter_count >= self.thresholds.stutter_rate_threshold;

        AudioAnalysis {
            rms,
            clip_ratio,
            is_clipping,
            is_silent,
            stutter_event,
            stutter_count,
            is_stuttering,
        }
    }
}

fn compute_rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64 + EPS).sqrt()
}

/// Convert interleaved/mono int16 PCM to normalized float32 samples.
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_requires_sustained_duration() {
        let mut analyzer = AudioAnalyzer::new(AudioThresholds {
            silence_duration_sec: 1.0,
            ..AudioThresholds::default()
        });
        let silence = vec![0.0f32; 480];
        let t0 = Instant::now();

        let first = analyzer.analyze(&silence, 48000, 480, t0, 0.0, 0.01);
        assert!(!first.is_silent);

        let later = analyzer.analyze(&silence, 48000, 480, t0 + Duration::from_millis(1100), 1.1, 0.02);
        assert!(later.is_silent);
    }

    #[test]
    fn loud_sample_clears_silence_clock() {
        let mut analyzer = AudioAnalyzer::new(AudioThresholds::default());
        let silence = vec![0.0f32; 10];
        let loud = vec![0.5f32; 10];
        let t0 = Instant::now();

        analyzer.analyze(&silence, 48000, 10, t0, 0.0, 0.0);
        let result = analyzer.analyze(&loud, 48000, 10, t0 + Duration::from_secs(10), 10.0, 1.0);
        assert!(!result.is_silent);
    }

    #[test]
    fn pts_rewind_counts_as_stutter() {
        let mut analyzer = AudioAnalyzer::new(AudioThresholds::default());
        let chunk = vec![0.1f32; 1024];
        let t0 = Instant::now();

        analyzer.analyze(&chunk, 48000, 1024, t0, 0.0, 1.0);
        let result = analyzer.analyze(&chunk, 48000, 1024, t0 + Duration::from_millis(20), 0.02, 0.5);
        assert!(result.stutter_event);
    }

    #[test]
    fn clipping_fires_above_ratio_threshold() {
        let mut analyzer = AudioAnalyzer::new(AudioThresholds::default());
        let mut chunk = vec![0.0f32; 100];
        for s in chunk.iter_mut().take(5) {
            *s = 1.0;
        }
        let result = analyzer.analyze(&chunk, 48000, 100, Instant::now(), 0.0, 0.0);
        assert!(result.is_clipping);
    }

    #[test]
    fn is_stuttering_requires_rate_threshold() {
        let mut analyzer = AudioAnalyzer::new(AudioThresholds {
            stutter_rate_threshold: 2,
            ..AudioThresholds::default()
        });
        let chunk = vec![0.1f32; 1024];
        let t0 = Instant::now();

        analyzer.analyze(&chunk, 48000, 1024, t0, 0.0, 1.0);
        let r1 = analyzer.analyze(&chunk, 48000, 1024, t0 + Duration::from_millis(10), 0.01, 0.5);
        assert!(!r1.is_stuttering);
        let r2 = analyzer.analyze(&chunk, 48000, 1024, t0 + Duration::from_millis(20), 0.02, 0.1);
        assert!(r2.is_stuttering);
    }
}
