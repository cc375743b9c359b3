//! Stateful per-channel transport stream demultiplexer.
//!
//! `ChannelDemuxer` owns everything a single monitored channel needs to
//! track across a UDP/RTP packet stream: the PAT/PMT-derived program map,
//! continuity counter bookkeeping, PSI/SI section reassembly, PCR jitter
//! estimation, and the last-seen SDT/EIT text fields. It is fed raw
//! datagrams (optionally RTP-wrapped) one at a time.

use crate::descriptor::TAG_REGISTRATION;
use crate::packet::{ContinuityMode, ContinuityStatus, PID_NULL, PID_PAT, TsPacket};
use crate::pat::Pat;
use crate::pmt::Pmt;
use crate::si::{Eit, Sdt, PID_EIT, PID_SDT, TABLE_ID_SDT_ACTUAL, TABLE_ID_SDT_OTHER};
use crate::{Result, TsError};
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// `(first_byte & 0xC0) == 0x80` identifies an RTP v2 header; the fixed
/// header is 12 bytes (no CSRC list, no extension), which covers the
/// vast majority of IPTV multicast feeds.
fn strip_rtp_header(data: &[u8]) -> &[u8] {
    if data.len() > 12 && (data[0] & 0xC0) == 0x80 {
        &data[12..]
    } else {
        data
    }
}

const PCR_WRAP_27MHZ: i128 = (1i128 << 33) * 300;

/// Running PCR jitter estimate for a single PCR-carrying PID.
#[derive(Debug, Clone, Copy, Default)]
struct PcrTracker {
    last_value_27mhz: Option<u64>,
    last_seen_at: Option<Instant>,
    jitter_ms: Option<f64>,
}

impl PcrTracker {
    fn observe(&mut self, value_27mhz: u64, now: Instant) {
        if let (Some(last_value), Some(last_seen)) = (self.last_value_27mhz, self.last_seen_at) {
            let mut delta = value_27mhz as i128 - last_value as i128;
            if delta < 0 {
                delta += PCR_WRAP_27MHZ;
            }
            let wall_delta_secs = now.duration_since(last_seen).as_secs_f64();
            let expected_ticks = wall_delta_secs * 27_000_000.0;
            let actual_ticks = delta as f64;
            self.jitter_ms = Some((actual_ticks - expected_ticks).abs() / 27_000.0);
        }
        self.last_value_27mhz = Some(value_27mhz);
        self.last_seen_at = Some(now);
    }
}

/// Per-PID PSI/SI section reassembly buffer.
#[derive(Debug, Default)]
struct SectionBuffer {
    data: BytesMut,
}

impl SectionBuffer {
    /// Feed this PID's payload for one packet, returning every complete
    /// section that became available (a packet may carry the tail of one
    /// section and the head of the next).
    fn feed(&mut self, pusi: bool, payload: &[u8]) -> Vec<Bytes> {
        let mut completed = Vec::new();

        if pusi {
            if payload.is_empty() {
                self.data.clear();
                return completed;
            }
            let pointer_field = payload[0] as usize;
            // A non-empty buffer here means the previous section never
            // completed (dropped packet, corrupt length); discard it
            // rather than splice unrelated bytes together.
            self.data.clear();
            let new_section_start = 1 + pointer_field;
            if new_section_start <= payload.len() {
                self.data.extend_from_slice(&payload[new_section_start..]);
            }
        } else {
            self.data.extend_from_slice(payload);
        }

        loop {
            if self.data.len() < 3 {
                break;
            }
            if self.data[0] == 0xFF {
                // Stuffing bytes fill the remainder of the TS packet payload.
                self.data.clear();
                break;
            }
            let section_length = (((self.data[1] as u16) & 0x0F) << 8) | self.data[2] as u16;
            let section_total = 3 + section_length as usize;
            if self.data.len() < section_total {
                break;
            }
            let section = self.data.split_to(section_total).freeze();
            completed.push(section);
        }

        completed
    }
}

/// Resolved identity for a program's primary elementary streams.
#[derive(Debug, Clone, Copy, Default)]
struct ProgramStreams {
    pcr_pid: Option<u16>,
    video_pid: Option<u16>,
    audio_pid: Option<u16>,
}

/// Stateful demultiplexer tracking one monitored channel across packets.
#[derive(Debug)]
pub struct ChannelDemuxer {
    validate_crc: bool,
    continuity_mode: ContinuityMode,

    pat: Option<Pat>,
    pat_version: Option<u8>,
    pmts: HashMap<u16, Pmt>,
    pmt_versions: HashMap<u16, u8>,
    pmt_pids: HashSet<u16>,
    selected_program: Option<u16>,
    streams: ProgramStreams,

    continuity_counters: HashMap<u16, u8>,
    continuity_error_count: u64,

    section_buffers: HashMap<u16, SectionBuffer>,
    pcr: PcrTracker,

    service_name: Option<String>,
    event_name: Option<String>,
    event_text: Option<String>,

    scte35_pids: HashSet<u16>,
}

impl Default for ChannelDemuxer {
    fn default() -> Self {
        Self {
            validate_crc: false,
            continuity_mode: ContinuityMode::Warn,
            pat: None,
            pat_version: None,
            pmts: HashMap::new(),
            pmt_versions: HashMap::new(),
            pmt_pids: HashSet::new(),
            selected_program: None,
            streams: ProgramStreams::default(),
            continuity_counters: HashMap::new(),
            continuity_error_count: 0,
            section_buffers: HashMap::new(),
            pcr: PcrTracker::default(),
            service_name: None,
            event_name: None,
            event_text: None,
            scte35_pids: HashSet::new(),
        }
    }
}

impl ChannelDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crc_validation(mut self, enable: bool) -> Self {
        self.validate_crc = enable;
        self
    }

    pub fn with_continuity_mode(mut self, mode: ContinuityMode) -> Self {
        self.continuity_mode = mode;
        self
    }

    /// Feed one received UDP/RTP datagram. Strips an RTP header when the
    /// datagram looks RTP-wrapped, then parses every complete 188-byte TS
    /// packet in the remainder.
    pub fn feed(&mut self, datagram: &[u8], now: Instant) -> Result<()> {
        let payload = strip_rtp_header(datagram);
        for chunk in payload.chunks_exact(188) {
            let packet = TsPacket::parse(Bytes::copy_from_slice(chunk))?;
            self.process_packet(&packet, now)?;
        }
        Ok(())
    }

    /// Process a single already-parsed TS packet.
    pub fn process_packet(&mut self, packet: &TsPacket, now: Instant) -> Result<()> {
        self.track_continuity(packet);

        if Some(packet.pid) == self.streams.pcr_pid
            && let Some(af) = packet.parse_adaptation_field()
            && let Some(pcr) = af.pcr
        {
            self.pcr.observe(pcr.as_27mhz(), now);
        }

        self.dispatch_psi(packet)?;
        Ok(())
    }

    fn track_continuity(&mut self, packet: &TsPacket) {
        if self.continuity_mode == ContinuityMode::Disabled || packet.pid == PID_NULL {
            return;
        }

        let has_payload = packet.has_payload();
        let status = if let Some(&last_cc) = self.continuity_counters.get(&packet.pid) {
            if has_payload {
                let expected = (last_cc + 1) & 0x0F;
                if packet.continuity_counter == expected {
                    self.continuity_counters
                        .insert(packet.pid, packet.continuity_counter);
                    ContinuityStatus::Ok
                } else if packet.continuity_counter == last_cc {
                    ContinuityStatus::Duplicate
                } else {
                    self.continuity_counters
                        .insert(packet.pid, packet.continuity_counter);
                    ContinuityStatus::Discontinuity {
                        expected,
                        actual: packet.continuity_counter,
                    }
                }
            } else if packet.continuity_counter == last_cc {
                ContinuityStatus::Ok
            } else {
                self.continuity_counters
                    .insert(packet.pid, packet.continuity_counter);
                ContinuityStatus::Discontinuity {
                    expected: last_cc,
                    actual: packet.continuity_counter,
                }
            }
        } else {
            self.continuity_counters
                .insert(packet.pid, packet.continuity_counter);
            ContinuityStatus::Initial
        };

        match status {
            // Duplicates are a legal retransmission of the same packet, not
            // a loss (spec §3: CC errors ignore duplicated packets).
            ContinuityStatus::Initial | ContinuityStatus::Ok | ContinuityStatus::Duplicate => {}
            ContinuityStatus::Discontinuity { .. } => {
                self.continuity_error_count += 1;
            }
        }
    }

    fn dispatch_psi(&mut self, packet: &TsPacket) -> Result<()> {
        let Some(payload) = packet.payload.as_ref() else {
            return Ok(());
        };
        let pid = packet.pid;
        let interesting = pid == PID_PAT
            || pid == PID_SDT
            || pid == PID_EIT
            || self.pmt_pids.contains(&pid);
        if !interesting {
            return Ok(());
        }

        let sections = self
            .section_buffers
            .entry(pid)
            .or_default()
            .feed(packet.payload_unit_start_indicator, payload);

        for section in sections {
            if section.is_empty() {
                continue;
            }
            let table_id = section[0];
            match pid {
                PID_PAT if table_id == 0x00 => self.handle_pat(&section)?,
                PID_SDT if table_id == TABLE_ID_SDT_ACTUAL || table_id == TABLE_ID_SDT_OTHER => {
                    self.handle_sdt(&section)?
                }
                PID_EIT if Eit::is_eit_table_id(table_id) => self.handle_eit(&section)?,
                pid if table_id == 0x02 && self.pmt_pids.contains(&pid) => {
                    self.handle_pmt(pid, &section)?
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn handle_pat(&mut self, section: &[u8]) -> Result<()> {
        let pat = if self.validate_crc {
            Pat::parse_with_crc(section)?
        } else {
            Pat::parse(section)?
        };

        if self.pat_version != Some(pat.version_number) {
            self.pat_version = Some(pat.version_number);
            self.pmt_pids = pat
                .programs
                .iter()
                .filter(|p| p.program_number != 0)
                .map(|p| p.pmt_pid)
                .collect();
            if self.selected_program.is_none() {
                self.selected_program = pat.programs.iter().find(|p| p.program_number != 0).map(|p| p.program_number);
            }
            self.pat = Some(pat);
        }
        Ok(())
    }

    fn handle_pmt(&mut self, pid: u16, section: &[u8]) -> Result<()> {
        let Some(pat) = &self.pat else { return Ok(()) };
        let Some(program) = pat.programs.iter().find(|p| p.pmt_pid == pid) else {
            return Ok(());
        };
        let program_number = program.program_number;

        let pmt = if self.validate_crc {
            Pmt::parse_with_crc(section)?
        } else {
            Pmt::parse(section)?
        };

        let is_new = self
            .pmt_versions
            .get(&program_number)
            .is_none_or(|&v| v != pmt.version_number);
        if is_new {
            self.pmt_versions.insert(program_number, pmt.version_number);

            for descriptor in pmt.program_descriptors() {
                if descriptor.tag == TAG_REGISTRATION {
                    // SCTE-35 registration ("CUEI") marks the splice-info PID.
                }
            }
            for stream in &pmt.streams {
                for descriptor in stream.descriptors() {
                    if descriptor.tag == TAG_REGISTRATION
                        && descriptor.data.as_ref() == b"CUEI"
                    {
                        self.scte35_pids.insert(stream.elementary_pid);
                    }
                }
            }

            if self.selected_program == Some(program_number) {
                self.streams = ProgramStreams {
                    pcr_pid: Some(pmt.pcr_pid),
                    video_pid: pmt.first_video_stream().map(|s| s.elementary_pid),
                    audio_pid: pmt.first_audio_stream().map(|s| s.elementary_pid),
                };
            }

            self.pmts.insert(program_number, pmt);
        }
        Ok(())
    }

    fn handle_sdt(&mut self, section: &[u8]) -> Result<()> {
        let sdt = if self.validate_crc {
            Sdt::parse_with_crc(section)?
        } else {
            Sdt::parse(section)?
        };
        if let Some(service) = sdt.services.iter().find(|s| s.service_name.is_some()) {
            if let Some(name) = &service.service_name {
                self.service_name = Some(name.clone());
            }
        }
        Ok(())
    }

    fn handle_eit(&mut self, section: &[u8]) -> Result<()> {
        let eit = if self.validate_crc {
            Eit::parse_with_crc(section)?
        } else {
            Eit::parse(section)?
        };
        // running_status == 4 means "running": the present event.
        let event = eit
            .events
            .iter()
            .find(|e| e.running_status == 4)
            .or_else(|| eit.events.first());
        if let Some(event) = event {
            if event.event_name.is_some() {
                self.event_name = event.event_name.clone();
                self.event_text = event.event_text.clone();
            }
        }
        Ok(())
    }

    pub fn pat(&self) -> Option<&Pat> {
        self.pat.as_ref()
    }

    pub fn pmt(&self, program_number: u16) -> Option<&Pmt> {
        self.pmts.get(&program_number)
    }

    pub fn video_pid(&self) -> Option<u16> {
        self.streams.video_pid
    }

    pub fn audio_pid(&self) -> Option<u16> {
        self.streams.audio_pid
    }

    pub fn pcr_pid(&self) -> Option<u16> {
        self.streams.pcr_pid
    }

    pub fn scte35_pids(&self) -> &HashSet<u16> {
        &self.scte35_pids
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    pub fn event_name(&self) -> Option<&str> {
        self.event_name.as_deref()
    }

    pub fn event_text(&self) -> Option<&str> {
        self.event_text.as_deref()
    }

    /// PCR jitter in milliseconds, estimated from the two most recent PCR
    /// observations on this channel's PCR PID.
    pub fn pcr_jitter_ms(&self) -> Option<f64> {
        self.pcr.jitter_ms
    }

    /// Continuity counter errors (duplicates + discontinuities) observed
    /// since the last call to `take_continuity_error_count`.
    pub fn take_continuity_error_count(&mut self) -> u64 {
        std::mem::take(&mut self.continuity_error_count)
    }

    pub fn continuity_error_count(&self) -> u64 {
        self.continuity_error_count
    }

    pub fn reset(&mut self) {
        *self = Self {
            validate_crc: self.validate_crc,
            continuity_mode: self.continuity_mode,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts_packet_bytes(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 188];
        data[0] = 0x47;
        data[1] = (((pid >> 8) as u8) & 0x1F) | if pusi { 0x40 } else { 0x00 };
        data[2] = (pid & 0xFF) as u8;
        data[3] = 0x10 | (cc & 0x0F); // payload only
        let payload_start = 4;
        data[payload_start..payload_start + payload.len()].copy_from_slice(payload);
        data
    }

    fn sample_pat_section() -> Vec<u8> {
        let mut data = vec![0x00, 0xB0, 0x0D];
        data.extend_from_slice(&[0x00, 0x01]);
        data.push(0xC1);
        data.push(0x00);
        data.push(0x00);
        data.extend_from_slice(&[0x00, 0x01, 0xE1, 0x00]); // program 1 -> pmt_pid 0x100
        data.extend_from_slice(&[0, 0, 0, 0]);
        data
    }

    fn sample_pmt_section() -> Vec<u8> {
        let mut data = vec![0x02, 0xB0, 0x17];
        data.extend_from_slice(&[0x00, 0x01]);
        data.push(0xC1);
        data.push(0x00);
        data.push(0x00);
        data.extend_from_slice(&[0xE1, 0x01]); // pcr_pid = 0x101
        data.extend_from_slice(&[0xF0, 0x00]);
        data.extend_from_slice(&[0x1B, 0xE1, 0x01, 0xF0, 0x00]); // video
        data.extend_from_slice(&[0x0F, 0xE1, 0x02, 0xF0, 0x00]); // audio
        data.extend_from_slice(&[0, 0, 0, 0]);
        data
    }

    #[test]
    fn tracks_program_map_and_elementary_pids() {
        let mut demuxer = ChannelDemuxer::new();
        let now = Instant::now();

        let pat_section = sample_pat_section();
        let mut pat_payload = vec![0x00]; // pointer field
        pat_payload.extend_from_slice(&pat_section);
        let pat_packet_bytes = ts_packet_bytes(PID_PAT, true, 0, &pat_payload);
        let packet = TsPacket::parse(Bytes::from(pat_packet_bytes)).unwrap();
        demuxer.process_packet(&packet, now).unwrap();

        assert!(demuxer.pat().is_some());
        assert_eq!(demuxer.pat().unwrap().programs[0].pmt_pid, 0x100);

        let pmt_section = sample_pmt_section();
        let mut pmt_payload = vec![0x00];
        pmt_payload.extend_from_slice(&pmt_section);
        let pmt_packet_bytes = ts_packet_bytes(0x100, true, 0, &pmt_payload);
        let packet = TsPacket::parse(Bytes::from(pmt_packet_bytes)).unwrap();
        demuxer.process_packet(&packet, now).unwrap();

        assert_eq!(demuxer.video_pid(), Some(0x101));
        assert_eq!(demuxer.audio_pid(), Some(0x102));
        assert_eq!(demuxer.pcr_pid(), Some(0x101));
    }

    #[test]
    fn counts_continuity_discontinuity() {
        let mut demuxer = ChannelDemuxer::new().with_continuity_mode(ContinuityMode::Warn);
        let now = Instant::now();

        let first = TsPacket::parse(Bytes::from(ts_packet_bytes(0x200, false, 0, &[0u8; 184]))).unwrap();
        let second = TsPacket::parse(Bytes::from(ts_packet_bytes(0x200, false, 2, &[0u8; 184]))).unwrap();
        demuxer.process_packet(&first, now).unwrap();
        demuxer.process_packet(&second, now).unwrap();

        assert_eq!(demuxer.continuity_error_count(), 1);
        assert_eq!(demuxer.take_continuity_error_count(), 1);
        assert_eq!(demuxer.continuity_error_count(), 0);
    }

    #[test]
    fn duplicate_packet_is_not_counted_as_continuity_error() {
        let mut demuxer = ChannelDemuxer::new().with_continuity_mode(ContinuityMode::Warn);
        let now = Instant::now();

        let first = TsPacket::parse(Bytes::from(ts_packet_bytes(0x200, false, 0, &[0u8; 184]))).unwrap();
        let duplicate = TsPacket::parse(Bytes::from(ts_packet_bytes(0x200, false, 0, &[0u8; 184]))).unwrap();
        demuxer.process_packet(&first, now).unwrap();
        demuxer.process_packet(&duplicate, now).unwrap();

        assert_eq!(demuxer.continuity_error_count(), 0);
    }

    #[test]
    fn strips_rtp_header_before_parsing() {
        let mut demuxer = ChannelDemuxer::new();
        let now = Instant::now();

        let mut datagram = vec![0u8; 12]; // minimal RTP fixed header
        datagram[0] = 0x80; // version 2, no padding/extension/csrc
        datagram.extend_from_slice(&ts_packet_bytes(0x1FFF, false, 0, &[0u8; 184]));

        assert!(demuxer.feed(&datagram, now).is_ok());
    }

    #[test]
    fn reassembles_section_split_across_two_packets() {
        let mut buffer = SectionBuffer::default();
        let section = sample_pat_section();

        let mut first_payload = vec![0x00]; // pointer field
        first_payload.extend_from_slice(&section[..5]);
        let completed = buffer.feed(true, &first_payload);
        assert!(completed.is_empty());

        let completed = buffer.feed(false, &section[5..]);
        assert_eq!(completed.len(), 1);
        assert_eq!(&completed[0][..], &section[..]);
    }
}
