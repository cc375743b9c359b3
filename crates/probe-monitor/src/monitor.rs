//! Per-channel ingest loop (spec §4.G): socket -> demux -> periodic decode
//! -> video/audio analysis -> status evaluation -> alert manager -> sinks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use chrono::Utc;
use probe_alert::AlertManager;
use probe_analysis::{
    AudioAnalysis, AudioAnalyzer, AudioThresholds, BitrateEstimator, VideoAnalysis, VideoAnalyzer,
    VideoThresholds,
};
use probe_core::model::{ChannelConfig, ChannelMetrics};
use probe_decode::TsDecoder;
use probe_sinks::{HotStateSink, SqlStore, TsdbSink};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ts::ChannelDemuxer;

use crate::config::MonitorConfig;
use crate::socket;
use crate::state::MonitorState;

/// Everything one channel's monitor task owns; mutated only from this
/// task (spec §3 invariant: a monitor writes only its own channel's
/// records, no cross-channel shared mutable state).
pub struct ChannelMonitor {
    channel: ChannelConfig,
    config: MonitorConfig,
    demuxer: ChannelDemuxer,
    bitrate: BitrateEstimator,
    video_analyzer: VideoAnalyzer,
    audio_analyzer: AudioAnalyzer,
    decoder: Option<Arc<TsDecoder>>,
    alert_manager: AlertManager,
    hot_state: HotStateSink,
    tsdb: TsdbSink,
    rolling_buffer: BytesMut,
    state: MonitorState,
    last_video: Option<VideoAnalysis>,
    last_audio: Option<AudioAnalysis>,
    last_thumbnail_path: Option<String>,
    /// Monitor task start, used to turn `Instant` samples into a
    /// monotonically increasing seconds value for the audio analyzer's
    /// silence hysteresis (spec §4.E).
    started_at: Instant,
}

impl ChannelMonitor {
    pub fn new(
        channel: ChannelConfig,
        config: MonitorConfig,
        sql: SqlStore,
        hot_state: HotStateSink,
        tsdb: TsdbSink,
    ) -> Self {
        let decoder = match TsDecoder::new() {
            Ok(decoder) => Some(Arc::new(decoder)),
            Err(err) => {
                warn!(channel_id = %channel.id, error = %err, "decoder unavailable, analysis will be stale");
                None
            }
        };

        let alert_manager = AlertManager::new(channel.id.clone(), sql, hot_state.clone());

        Self {
            demuxer: ChannelDemuxer::new(),
            bitrate: BitrateEstimator::default(),
            video_analyzer: VideoAnalyzer::new(VideoThresholds::default()),
            audio_analyzer: AudioAnalyzer::new(AudioThresholds::default()),
            decoder,
            alert_manager,
            hot_state,
            tsdb,
            rolling_buffer: BytesMut::new(),
            state: MonitorState::WaitingSocket,
            last_video: None,
            last_audio: None,
            last_thumbnail_path: None,
            started_at: Instant::now(),
            channel,
            config,
        }
    }

    /// Run until `cancel` fires. Socket bind failures are retried with a
    /// backoff sleep rather than propagated (spec §4.G step 5/§7).
    pub async fn run(mut self, cancel: CancellationToken) {
        self.alert_manager.preload_active().await;

        let mut socket = loop {
            if cancel.is_cancelled() {
                return;
            }
            match socket::bind_multicast(
                self.channel.multicast_group,
                self.channel.port,
                self.config.socket_rcvbuf,
            ) {
                Ok(socket) => {
                    self.state = self.state.on_bind_success();
                    break socket;
                }
                Err(err) => {
                    self.state = self.state.on_bind_failure();
                    warn!(channel_id = %self.channel.id, error = %err, "socket bind failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                    }
                }
            }
        };

        info!(channel_id = %self.channel.id, group = %self.channel.multicast_group, port = self.channel.port, "monitor started");

        let mut recv_buf = vec![0u8; 4096];
        let mut tick_interval = tokio::time::interval(Duration::from_secs(1));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut decode_interval = tokio::time::interval(self.config.frame_sample_interval);
        decode_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut pending_decode: Option<
            tokio::task::JoinHandle<probe_decode::Result<probe_decode::DecodedSample>>,
        > = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!(channel_id = %self.channel.id, "monitor shutting down");
                    break;
                }

                result = async { pending_decode.as_mut().unwrap().await }, if pending_decode.is_some() => {
                    pending_decode = None;
                    self.handle_decode_result(result);
                }

                _ = tick_interval.tick() => {
                    self.run_tick().await;
                }

                _ = decode_interval.tick(), if pending_decode.is_none() && self.decoder.is_some() => {
                    if let Some(handle) = self.spawn_decode() {
                        pending_decode = Some(handle);
                    }
                }

                recv = tokio::time::timeout(self.config.udp_timeout, socket.recv_from(&mut recv_buf)) => {
                    match recv {
                        Ok(Ok((n, _src))) => {
                            self.state = self.state.on_datagram_received();
                            self.on_datagram(&recv_buf[..n]);
                        }
                        Ok(Err(err)) => {
                            warn!(channel_id = %self.channel.id, error = %err, "udp recv error");
                        }
                        Err(_elapsed) => {
                            self.state = self.state.on_receive_timeout();
                        }
                    }
                }
            }
        }
    }

    fn on_datagram(&mut self, datagram: &[u8]) {
        let now = Instant::now();
        if let Err(err) = self.demuxer.feed(datagram, now) {
            debug!(channel_id = %self.channel.id, error = %err, "malformed TS datagram, skipped");
        }
        self.bitrate.update(datagram.len() as u64, now);

        self.rolling_buffer.extend_from_slice(datagram);
        if self.rolling_buffer.len() > self.config.rolling_buffer_cap {
            let overflow = self.rolling_buffer.len() - self.config.rolling_buffer_cap;
            let _ = self.rolling_buffer.split_to(overflow);
        }
    }

    fn spawn_decode(
        &mut self,
    ) -> Option<tokio::task::JoinHandle<probe_decode::Result<probe_decode::DecodedSample>>> {
        if self.rolling_buffer.is_empty() {
            return None;
        }
        let decoder = self.decoder.clone()?;
        let buf = self.rolling_buffer.split().freeze();
        Some(tokio::task::spawn_blocking(move || decoder.decode(&buf)))
    }

    fn handle_decode_result(
        &mut self,
        result: std::result::Result<probe_decode::Result<probe_decode::DecodedSample>, tokio::task::JoinError>,
    ) {
        let sample = match result {
            Ok(Ok(sample)) => sample,
            Ok(Err(err)) => {
                debug!(channel_id = %self.channel.id, error = %err, "decode failed, keeping last analyzer state");
                return;
            }
            Err(err) => {
                debug!(channel_id = %self.channel.id, error = %err, "decode task panicked/cancelled");
                return;
            }
        };

        let now = Instant::now();
        if let Some(frame) = &sample.video {
            let analysis = self
                .video_analyzer
                .analyze(frame, now, sample.corrupt_frame_ratio);
            let alarm = analysis.is_black || analysis.is_frozen || analysis.is_mosaic;
            match self.video_analyzer.write_thumbnail(
                frame,
                &self.config.thumbnail_dir,
                &self.channel.id,
                alarm,
                Utc::now().timestamp(),
                self.config.thumbnail_quality_latest,
                self.config.thumbnail_quality_alarm,
            ) {
                Ok(path) => self.last_thumbnail_path = Some(path),
                Err(err) => {
                    warn!(channel_id = %self.channel.id, error = %err, "thumbnail write failed");
                }
            }
            self.last_video = Some(analysis);
        }

        if let Some(audio) = &sample.audio {
            let ts = Instant::now();
            let ts_secs = ts.duration_since(self.started_at).as_secs_f64();
            let analysis = self.audio_analyzer.analyze(
                &audio.samples,
                audio.sample_rate,
                audio.sample_count,
                ts,
                ts_secs,
                audio.pts_secs,
            );
            self.last_audio = Some(analysis);
        }
    }

    /// Once-per-second tick (spec §4.G step 4): assemble metrics, evaluate
    /// status, drive alert transitions, publish to sinks.
    async fn run_tick(&mut self) {
        let is_offline = self.state.is_offline();
        let channel_name = self
            .demuxer
            .service_name()
            .map(str::to_string)
            .unwrap_or_else(|| self.channel.display_name.clone());
        // Reset every tick regardless of offline status so the counter
        // never grows unbounded across an offline stretch (spec §4.G step 4).
        let cc_errors_per_sec = self.demuxer.take_continuity_error_count() as f64;

        let metrics = if is_offline {
            ChannelMetrics::offline(
                self.channel.id.clone(),
                channel_name,
                self.channel.expected_bitrate_kbps,
            )
        } else {
            let video = self.last_video;
            let audio = self.last_audio;
            ChannelMetrics {
                channel_id: self.channel.id.clone(),
                channel_name,
                is_offline: false,
                is_black: video.map(|v| v.is_black).unwrap_or(false),
                is_frozen: video.map(|v| v.is_frozen).unwrap_or(false),
                is_silent: audio.map(|a| a.is_silent).unwrap_or(false),
                is_clipping: audio.map(|a| a.is_clipping).unwrap_or(false),
                is_mosaic: video.map(|v| v.is_mosaic).unwrap_or(false),
                mosaic_ratio: video.map(|v| v.mosaic_ratio).unwrap_or(0.0),
                is_stuttering: audio.map(|a| a.is_stuttering).unwrap_or(false),
                stutter_count: audio.map(|a| a.stutter_count).unwrap_or(0),
                cc_errors_per_sec,
                pcr_jitter_ms: self.demuxer.pcr_jitter_ms().unwrap_or(0.0),
                bitrate_kbps: self.bitrate.bitrate_kbps(),
                expected_bitrate_kbps: self.channel.expected_bitrate_kbps,
                audio_rms: audio.map(|a| a.rms).unwrap_or(0.0),
                video_brightness: video.map(|v| v.brightness).unwrap_or(0.0),
                thumbnail_path: self.last_thumbnail_path.clone(),
                timestamp: Utc::now(),
            }
        };

        let (status, kinds) = probe_analysis::evaluate(&metrics);
        self.alert_manager.tick(&metrics, &kinds).await;
        self.hot_state.publish_metrics(&metrics, status).await;
        self.tsdb.write(metrics, status).await;
    }
}
