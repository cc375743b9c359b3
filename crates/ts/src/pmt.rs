//! Program Map Table (PMT), table_id 0x02, one per program on its own PID.

use crate::descriptor::DescriptorIterator;
use crate::pat::validate_crc;
use crate::{Result, TsError};
use bytes::{Buf, Bytes};

/// Elementary stream type, as carried in the PMT stream loop (ISO/IEC 13818-1 Table 2-34).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Mpeg1Video,
    Mpeg2Video,
    Mpeg4Visual,
    Mpeg1Audio,
    Mpeg2Audio,
    Avc,
    Hevc,
    Aac,
    AacLatm,
    Ac3,
    Eac3,
    Dts,
    Other(u8),
}

impl From<u8> for StreamType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => StreamType::Mpeg1Video,
            0x02 => StreamType::Mpeg2Video,
            0x10 => StreamType::Mpeg4Visual,
            0x03 => StreamType::Mpeg1Audio,
            0x04 => StreamType::Mpeg2Audio,
            0x1B => StreamType::Avc,
            0x24 => StreamType::Hevc,
            0x0F => StreamType::Aac,
            0x11 => StreamType::AacLatm,
            0x81 => StreamType::Ac3,
            0x06 => StreamType::Eac3,
            0x82 => StreamType::Dts,
            other => StreamType::Other(other),
        }
    }
}

impl StreamType {
    /// True for stream types the monitor treats as a channel's primary video stream.
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            StreamType::Mpeg1Video
                | StreamType::Mpeg2Video
                | StreamType::Mpeg4Visual
                | StreamType::Avc
                | StreamType::Hevc
        )
    }

    /// True for stream types the monitor treats as a channel's primary audio stream.
    ///
    /// `Eac3` doubles as stream_type 0x06 (private/PES packetized data) in some muxes;
    /// callers that need strict AC-3 family detection should also check the registration
    /// descriptor (tag 0x05, format_identifier "AC-3"/"EAC3"). `Dts` is similarly shared
    /// with vendor-private use of 0x82 in some muxes.
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            StreamType::Mpeg1Audio
                | StreamType::Mpeg2Audio
                | StreamType::Aac
                | StreamType::AacLatm
                | StreamType::Ac3
                | StreamType::Eac3
                | StreamType::Dts
        )
    }
}

/// A single elementary stream entry in a PMT.
#[derive(Debug, Clone)]
pub struct PmtStream {
    pub stream_type: StreamType,
    pub elementary_pid: u16,
    pub es_info: Bytes,
}

impl PmtStream {
    pub fn descriptors(&self) -> DescriptorIterator {
        DescriptorIterator::new(self.es_info.clone())
    }
}

/// Owned, fully parsed Program Map Table.
#[derive(Debug, Clone)]
pub struct Pmt {
    pub table_id: u8,
    pub program_number: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub pcr_pid: u16,
    pub program_info: Bytes,
    pub streams: Vec<PmtStream>,
}

impl Pmt {
    /// Parse a PMT from a reassembled PSI section (pointer field already removed).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(TsError::InsufficientData {
                expected: 12,
                actual: data.len(),
            });
        }

        let mut reader = data;
        let table_id = reader.get_u8();
        if table_id != 0x02 {
            return Err(TsError::InvalidTableId {
                expected: 0x02,
                actual: table_id,
            });
        }

        let byte1 = reader.get_u8();
        let section_syntax_indicator = (byte1 & 0x80) != 0;
        if !section_syntax_indicator {
            return Err(TsError::ParseError(
                "PMT must have section syntax indicator set".to_string(),
            ));
        }
        let section_length = ((byte1 as u16 & 0x0F) << 8) | reader.get_u8() as u16;
        if section_length < 13 {
            return Err(TsError::InvalidSectionLength(section_length));
        }
        if data.len() < (3 + section_length as usize) {
            return Err(TsError::InsufficientData {
                expected: 3 + section_length as usize,
                actual: data.len(),
            });
        }

        let program_number = reader.get_u16();
        let byte5 = reader.get_u8();
        let version_number = (byte5 >> 1) & 0x1F;
        let current_next_indicator = (byte5 & 0x01) != 0;
        let section_number = reader.get_u8();
        let last_section_number = reader.get_u8();
        let pcr_pid_high = reader.get_u8();
        let pcr_pid_low = reader.get_u8();
        let pcr_pid = ((pcr_pid_high as u16 & 0x1F) << 8) | pcr_pid_low as u16;

        let prog_info_len_high = reader.get_u8();
        let prog_info_len_low = reader.get_u8();
        let program_info_length =
            (((prog_info_len_high as u16) & 0x0F) << 8) | prog_info_len_low as u16;
        let program_info_length = program_info_length as usize;

        if (section_length as usize) < 9 + program_info_length + 4 {
            return Err(TsError::InvalidSectionLength(section_length));
        }

        let program_info_offset = 12;
        let program_info =
            Bytes::copy_from_slice(&data[program_info_offset..program_info_offset + program_info_length]);

        let streams_offset = program_info_offset + program_info_length;
        let streams_end = 3 + section_length as usize - 4; // exclude trailing CRC32
        let mut streams = Vec::new();
        let mut offset = streams_offset;
        while offset + 5 <= streams_end {
            let stream_type = StreamType::from(data[offset]);
            let elementary_pid = ((data[offset + 1] as u16 & 0x1F) << 8) | data[offset + 2] as u16;
            let es_info_length =
                (((data[offset + 3] as u16) & 0x0F) << 8) | data[offset + 4] as u16;
            let es_info_length = es_info_length as usize;
            let es_info_start = offset + 5;
            let es_info_end = es_info_start + es_info_length;
            if es_info_end > streams_end {
                return Err(TsError::InsufficientData {
                    expected: es_info_end,
                    actual: streams_end,
                });
            }
            streams.push(PmtStream {
                stream_type,
                elementary_pid,
                es_info: Bytes::copy_from_slice(&data[es_info_start..es_info_end]),
            });
            offset = es_info_end;
        }

        Ok(Pmt {
            table_id,
            program_number,
            version_number,
            current_next_indicator,
            section_number,
            last_section_number,
            pcr_pid,
            program_info,
            streams,
        })
    }

    /// Parse a PMT section, validating its trailing CRC-32/MPEG-2 first.
    pub fn parse_with_crc(data: &[u8]) -> Result<Self> {
        validate_crc(data)?;
        Self::parse(data)
    }

    pub fn program_descriptors(&self) -> DescriptorIterator {
        DescriptorIterator::new(self.program_info.clone())
    }

    /// First stream matching the stream types the monitor treats as video.
    pub fn first_video_stream(&self) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.stream_type.is_video())
    }

    /// First stream matching the stream types the monitor treats as audio.
    pub fn first_audio_stream(&self) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.stream_type.is_audio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pmt_bytes() -> Vec<u8> {
        let mut data = vec![0x02, 0xB0, 0x17];
        data.extend_from_slice(&[0x00, 0x01]); // program_number
        data.push(0xC1); // version/current_next
        data.push(0x00); // section_number
        data.push(0x00); // last_section_number
        data.extend_from_slice(&[0xE1, 0x01]); // pcr_pid = 0x101
        data.extend_from_slice(&[0xF0, 0x00]); // program_info_length = 0
        // video stream: type 0x1B, pid 0x101, es_info_length 0
        data.extend_from_slice(&[0x1B, 0xE1, 0x01, 0xF0, 0x00]);
        // audio stream: type 0x0F, pid 0x102, es_info_length 0
        data.extend_from_slice(&[0x0F, 0xE1, 0x02, 0xF0, 0x00]);
        data.extend_from_slice(&[0, 0, 0, 0]); // fake CRC
        data
    }

    #[test]
    fn parses_video_and_audio_streams() {
        let data = sample_pmt_bytes();
        let pmt = Pmt::parse(&data).unwrap();
        assert_eq!(pmt.program_number, 1);
        assert_eq!(pmt.pcr_pid, 0x101);
        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.first_video_stream().unwrap().elementary_pid, 0x101);
        assert_eq!(pmt.first_audio_stream().unwrap().elementary_pid, 0x102);
    }

    #[test]
    fn rejects_wrong_table_id() {
        let mut data = sample_pmt_bytes();
        data[0] = 0x00;
        assert!(matches!(
            Pmt::parse(&data),
            Err(TsError::InvalidTableId {
                expected: 0x02,
                actual: 0x00
            })
        ));
    }
}
