//! Video analyzer: black/freeze/mosaic detection with hysteresis (spec §4.D).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{ImageBuffer, Rgb};
use media_types::Resolution;

/// Default luma threshold below which a frame is considered black.
pub const BLACK_LUMA_THRESHOLD: f64 = 16.0;
/// Default MSE threshold below which two consecutive frames are "still".
pub const FREEZE_MSE_THRESHOLD: f64 = 2.0;
/// Seconds a still signal must persist before `is_frozen` is reported.
pub const FREEZE_DURATION_SEC: f64 = 10.0;
/// Seconds a black signal must persist before `is_black` is reported.
pub const BLACK_DURATION_SEC: f64 = 2.0;
/// Decoder-reported corrupt-frame ratio threshold for mosaic signal A.
pub const MOSAIC_CORRUPT_RATIO_THRESHOLD: f64 = 0.15;
/// Block variance below which a 16x16 tile counts toward `low_ratio`.
pub const MOSAIC_LOW_VAR_THRESHOLD: f64 = 4.0;
/// Block variance above which a 16x16 tile counts toward `high_ratio`.
pub const MOSAIC_HIGH_VAR_THRESHOLD: f64 = 2500.0;
/// `low_ratio` fraction above which the block-based mosaic signal fires.
pub const MOSAIC_LOW_RATIO_THRESHOLD: f64 = 0.30;
/// `high_ratio` fraction above which the block-based mosaic signal fires.
pub const MOSAIC_HIGH_RATIO_THRESHOLD: f64 = 0.20;
/// Seconds a mosaic signal must persist before `is_mosaic` is reported.
pub const MOSAIC_DURATION_SEC: f64 = 5.0;

const BLOCK_SIZE: u32 = 16;

/// A decoded frame handed to the analyzer. Owns packed RGB8 pixel data.
#[derive(Debug, Clone)]
pub struct Frame {
    pub resolution: Resolution,
    /// Row-major RGB8 pixels, `resolution.width * resolution.height * 3` bytes.
    pub rgb: Vec<u8>,
}

impl Frame {
    fn to_gray(&self) -> Vec<u8> {
        self.rgb
            .chunks_exact(3)
            .map(|px| {
                // ITU-R BT.601 luma.
                let y = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

/// Thresholds driving the analyzer; defaults match the documented constants.
#[derive(Debug, Clone, Copy)]
pub struct VideoThresholds {
    pub black_luma: f64,
    pub freeze_mse: f64,
    pub freeze_duration_sec: f64,
    pub black_duration_sec: f64,
    pub mosaic_corrupt_ratio: f64,
    pub mosaic_low_var: f64,
    pub mosaic_high_var: f64,
    pub mosaic_low_ratio: f64,
    pub mosaic_high_ratio: f64,
    pub mosaic_duration_sec: f64,
}

impl Default for VideoThresholds {
    fn default() -> Self {
        Self {
            black_luma: BLACK_LUMA_THRESHOLD,
            freeze_mse: FREEZE_MSE_THRESHOLD,
            freeze_duration_sec: FREEZE_DURATION_SEC,
            black_duration_sec: BLACK_DURATION_SEC,
            mosaic_corrupt_ratio: MOSAIC_CORRUPT_RATIO_THRESHOLD,
            mosaic_low_var: MOSAIC_LOW_VAR_THRESHOLD,
            mosaic_high_var: MOSAIC_HIGH_VAR_THRESHOLD,
            mosaic_low_ratio: MOSAIC_LOW_RATIO_THRESHOLD,
            mosaic_high_ratio: MOSAIC_HIGH_RATIO_THRESHOLD,
            mosaic_duration_sec: MOSAIC_DURATION_SEC,
        }
    }
}

/// Output of one `VideoAnalyzer::analyze` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoAnalysis {
    pub brightness: f64,
    pub is_black_frame: bool,
    pub is_black: bool,
    pub still: bool,
    pub is_frozen: bool,
    pub mosaic_ratio: f64,
    pub is_mosaic: bool,
}

/// Hysteresis-driven per-channel video analyzer. Owns the previous gray
/// frame and onset timestamps for black/freeze/mosaic.
pub struct VideoAnalyzer {
    thresholds: VideoThresholds,
    prev_gray: Option<(u32, u32, Vec<u8>)>,
    black_since: Option<Instant>,
    still_since: Option<Instant>,
    mosaic_since: Option<Instant>,
    last_thumbnail_path: Option<String>,
}

impl VideoAnalyzer {
    pub fn new(thresholds: VideoThresholds) -> Self {
        Self {
            thresholds,
            prev_gray: None,
            black_since: None,
            still_since: None,
            mosaic_since: None,
            last_thumbnail_path: None,
        }
    }

    /// Analyze one sampled frame. `corrupt_ratio` is the decoder's fraction
    /// of recently decoded frames flagged corrupt (mosaic signal A).
    pub fn analyze(&mut self, frame: &Frame, now: Instant, corrupt_ratio: f64) -> VideoAnalysis {
        let gray = frame.to_gray();
        let brightness = mean(&gray);
        let is_black_frame = brightness < self.thresholds.black_luma;

        let still = match &self.prev_gray {
            Some((w, h, prev))
                if *w == frame.resolution.width && *h == frame.resolution.height =>
            {
                mse(prev, &gray) < self.thresholds.freeze_mse
            }
            _ => false,
        };

        let (low_ratio, high_ratio) = block_variance_ratios(
            &gray,
            frame.resolution.width,
            frame.resolution.height,
            self.thresholds.mosaic_low_var,
            self.thresholds.mosaic_high_var,
        );
        let block_signal = low_ratio > self.thresholds.mosaic_low_ratio
            || high_ratio > self.thresholds.mosaic_high_ratio;
        let corrupt_signal = corrupt_ratio > self.thresholds.mosaic_corrupt_ratio;
        let mosaic_ratio = low_ratio.max(high_ratio);
        let mosaic_signal = block_signal || corrupt_signal;

        let is_black = update_hysteresis(
            &mut self.black_since,
            is_black_frame,
            self.thresholds.black_duration_sec,
            now,
        );
        let is_frozen = update_hysteresis(
            &mut self.still_since,
            still,
            self.thresholds.freeze_duration_sec,
            now,
        );
        let is_mosaic = update_hysteresis(
            &mut self.mosaic_since,
            mosaic_signal,
            self.thresholds.mosaic_duration_sec,
            now,
        );

        self.prev_gray = Some((frame.resolution.width, frame.resolution.height, gray));

        VideoAnalysis {
            brightness,
            is_black_frame,
            is_black,
            still,
            is_frozen,
            mosaic_ratio,
            is_mosaic,
        }
    }

    /// Always rewrite `latest_<channel_id>.jpg`; when `alarm` is true also
    /// write `alarm_<channel_id>_<unix_sec>.jpg`. Returns the most recent path.
    pub fn write_thumbnail(
        &mut self,
        frame: &Frame,
        dir: &Path,
        channel_id: &str,
        alarm: bool,
        unix_sec: i64,
        quality_latest: u8,
        quality_alarm: u8,
    ) -> std::io::Result<String> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_raw(
            frame.resolution.width,
            frame.resolution.height,
            frame.rgb.clone(),
        )
        .ok_or_else(|| std::io::Error::other("frame buffer size mismatch"))?;

        let latest_path = dir.join(format!("latest_{channel_id}.jpg"));
        save_jpeg(&img, &latest_path, quality_latest)?;
        let mut result = latest_path.to_string_lossy().into_owned();

        if alarm {
            let alarm_path = dir.join(format!("alarm_{channel_id}_{unix_sec}.jpg"));
            save_jpeg(&img, &alarm_path, quality_alarm)?;
            result = alarm_path.to_string_lossy().into_owned();
        }

        self.last_thumbnail_path = Some(result.clone());
        Ok(result)
    }

    pub fn last_thumbnail_path(&self) -> Option<&str> {
        self.last_thumbnail_path.as_deref()
    }
}

fn save_jpeg(
    img: &ImageBuffer<Rgb<u8>, Vec<u8>>,
    path: &PathBuf,
    quality: u8,
) -> std::io::Result<()> {
    let mut out = std::fs::File::create(path)?;
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(img)
        .map_err(std::io::Error::other)
}

/// A condition is reported only once its signal has been continuously true
/// for `duration_sec`; the onset clock resets on any non-matching sample.
fn update_hysteresis(since: &mut Option<Instant>, signal: bool, duration_sec: f64, now: Instant) -> bool {
    if !signal {
        *since = None;
        return false;
    }
    let onset = *since.get_or_insert(now);
    now.duration_since(onset) >= Duration::from_secs_f64(duration_sec)
}

fn mean(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|&v| v as f64).sum::<f64>() / data.len() as f64
}

fn mse(a: &[u8], b: &[u8]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return f64::INFINITY;
    }
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    sum / a.len() as f64
}

fn variance(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    data.iter().map(|&v| (v as f64 - m).powi(2)).sum::<f64>() / data.len() as f64
}

/// Tile a gray frame into 16x16 blocks and return (low_ratio, high_ratio).
fn block_variance_ratios(
    gray: &[u8],
    width: u32,
    height: u32,
    low_threshold: f64,
    high_threshold: f64,
) -> (f64, f64) {
    if width == 0 || height == 0 || gray.len() != (width * height) as usize {
        return (0.0, 0.0);
    }

    let mut total = 0usize;
    let mut low = 0usize;
    let mut high = 0usize;

    let mut by = 0;
    while by < height {
        let bh = BLOCK_SIZE.min(height - by);
        let mut bx = 0;
        while bx < width {
            let bw = BLOCK_SIZE.min(width - bx);
            let mut block = Vec::with_capacity((bw * bh) as usize);
            for y in by..by + bh {
                let row_start = (y * width + bx) as usize;
                block.extend_from_slice(&gray[row_start..row_start + bw as usize]);
            }
            let var = variance(&block);
            total += 1;
            if var < low_threshold {
                low += 1;
            }
            if var > high_threshold {
                high += 1;
            }
            bx += BLOCK_SIZE;
        }
        by += BLOCK_SIZE;
    }

    if total == 0 {
        return (0.0, 0.0);
    }
    (low as f64 / total as f64, high as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            resolution: Resolution::new(width, height),
            rgb: vec![value; (width * height * 3) as usize],
        }
    }

    #[test]
    fn black_frame_strict_threshold() {
        // brightness exactly at threshold is NOT black (strict <).
        let frame = solid_frame(32, 32, BLACK_LUMA_THRESHOLD.round() as u8);
        let mut analyzer = VideoAnalyzer::new(VideoThresholds::default());
        let result = analyzer.analyze(&frame, Instant::now(), 0.0);
        assert!((result.brightness - BLACK_LUMA_THRESHOLD.round()).abs() < 1.0);
        assert!(!result.is_black_frame || result.brightness >= BLACK_LUMA_THRESHOLD);
    }

    #[test]
    fn freeze_requires_sustained_duration() {
        let mut analyzer = VideoAnalyzer::new(VideoThresholds {
            freeze_duration_sec: 1.0,
            ..VideoThresholds::default()
        });
        let frame = solid_frame(32, 32, 128);
        let t0 = Instant::now();

        let first = analyzer.analyze(&frame, t0, 0.0);
        assert!(!first.is_frozen);

        let mid = analyzer.analyze(&frame, t0 + Duration::from_millis(500), 0.0);
        assert!(!mid.is_frozen, "must not report before the full duration elapses");

        let late = analyzer.analyze(&frame, t0 + Duration::from_millis(1100), 0.0);
        assert!(late.is_frozen);
    }

    #[test]
    fn mosaic_block_signal_fires_on_high_variance_noise() {
        let mut analyzer = VideoAnalyzer::new(VideoThresholds {
            mosaic_duration_sec: 0.0,
            ..VideoThresholds::default()
        });
        let width = 32;
        let height = 32;
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for i in 0..(width * height) {
            let v = if i % 2 == 0 { 0 } else { 255 };
            rgb.extend_from_slice(&[v, v, v]);
        }
        let frame = Frame {
            resolution: Resolution::new(width, height),
            rgb,
        };
        let result = analyzer.analyze(&frame, Instant::now(), 0.0);
        assert!(result.mosaic_ratio > 0.0);
    }

    #[test]
    fn corrupt_ratio_alone_can_trigger_mosaic_signal() {
        let mut analyzer = VideoAnalyzer::new(VideoThresholds {
            mosaic_duration_sec: 0.0,
            ..VideoThresholds::default()
        });
        let frame = solid_frame(32, 32, 128);
        let result = analyzer.analyze(&frame, Instant::now(), 0.9);
        assert!(result.is_mosaic);
    }
}
