//! Program Association Table (PAT), table_id 0x00 on PID 0x0000.

use crate::{Result, TsError};
use bytes::Buf;

/// A single program entry in a PAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatProgram {
    pub program_number: u16,
    /// PID of the PMT for this program (or the network PID when `program_number == 0`).
    pub pmt_pid: u16,
}

/// Owned, fully parsed Program Association Table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    pub table_id: u8,
    pub transport_stream_id: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub programs: Vec<PatProgram>,
}

impl Pat {
    /// Parse a PAT from a reassembled PSI section (pointer field already removed).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(TsError::InsufficientData {
                expected: 8,
                actual: data.len(),
            });
        }

        let mut reader = data;
        let table_id = reader.get_u8();
        if table_id != 0x00 {
            return Err(TsError::InvalidTableId {
                expected: 0x00,
                actual: table_id,
            });
        }

        let byte1 = reader.get_u8();
        let section_syntax_indicator = (byte1 & 0x80) != 0;
        if !section_syntax_indicator {
            return Err(TsError::ParseError(
                "PAT must have section syntax indicator set".to_string(),
            ));
        }
        let section_length = ((byte1 as u16 & 0x0F) << 8) | reader.get_u8() as u16;
        if section_length < 9 {
            return Err(TsError::InvalidSectionLength(section_length));
        }
        if data.len() < (3 + section_length as usize) {
            return Err(TsError::InsufficientData {
                expected: 3 + section_length as usize,
                actual: data.len(),
            });
        }

        let transport_stream_id = reader.get_u16();
        let byte5 = reader.get_u8();
        let version_number = (byte5 >> 1) & 0x1F;
        let current_next_indicator = (byte5 & 0x01) != 0;
        let section_number = reader.get_u8();
        let last_section_number = reader.get_u8();

        let programs_end = 3 + section_length as usize - 4; // exclude trailing CRC32
        let programs_data = &data[8..programs_end];

        let mut programs = Vec::with_capacity(programs_data.len() / 4);
        let mut chunks = programs_data.chunks_exact(4);
        for chunk in &mut chunks {
            let program_number = u16::from_be_bytes([chunk[0], chunk[1]]);
            let pmt_pid = ((chunk[2] as u16 & 0x1F) << 8) | chunk[3] as u16;
            programs.push(PatProgram {
                program_number,
                pmt_pid,
            });
        }

        Ok(Pat {
            table_id,
            transport_stream_id,
            version_number,
            current_next_indicator,
            section_number,
            last_section_number,
            programs,
        })
    }

    /// Parse a PAT section, validating its trailing CRC-32/MPEG-2 first.
    pub fn parse_with_crc(data: &[u8]) -> Result<Self> {
        validate_crc(data)?;
        Self::parse(data)
    }
}

/// Shared CRC-32/MPEG-2 validation for PAT and PMT sections.
pub(crate) fn validate_crc(data: &[u8]) -> Result<()> {
    if data.len() < 7 {
        return Ok(());
    }
    let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;
    let section_end = 3 + section_length as usize;
    if section_end > data.len() || section_end < 4 {
        return Ok(());
    }
    if !crate::crc32::validate_section_crc32(&data[..section_end]) {
        let stored = u32::from_be_bytes([
            data[section_end - 4],
            data[section_end - 3],
            data[section_end - 2],
            data[section_end - 1],
        ]);
        let calculated = crate::crc32::mpeg2_crc32(&data[..section_end - 4]);
        return Err(TsError::Crc32Mismatch {
            expected: stored,
            calculated,
        });
    }
    Ok(())
}
