//! Error types for MPEG Transport Stream parsing.

use thiserror::Error;

/// Errors that can occur while parsing TS packets, PSI/SI sections, and PES headers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TsError {
    /// A TS packet slice was not exactly 188 bytes.
    #[error("invalid packet size: expected 188 bytes, got {0}")]
    InvalidPacketSize(usize),

    /// The sync byte (first byte of a TS packet) was not 0x47.
    #[error("invalid sync byte: expected 0x47, got {0:#04x}")]
    InvalidSyncByte(u8),

    /// Not enough bytes remained to parse a field.
    #[error("insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    /// A PSI section carried an unexpected table_id.
    #[error("invalid table id: expected {expected:#04x}, got {actual:#04x}")]
    InvalidTableId { expected: u8, actual: u8 },

    /// A PSI section declared an implausible section_length.
    #[error("invalid section length: {0}")]
    InvalidSectionLength(u16),

    /// CRC-32/MPEG-2 validation failed for a PSI section.
    #[error("CRC-32 mismatch: expected {expected:#010x}, calculated {calculated:#010x}")]
    Crc32Mismatch { expected: u32, calculated: u32 },

    /// Continuity counter discontinuity observed on a PID.
    #[error("continuity error on PID {pid}: expected {expected}, got {actual}")]
    ContinuityError { pid: u16, expected: u8, actual: u8 },

    /// A duplicated TS packet (same continuity counter as the previous one).
    #[error("duplicate packet on PID {pid}: continuity counter {cc}")]
    DuplicatePacket { pid: u16, cc: u8 },

    /// A PES packet did not begin with the 0x000001 start code.
    #[error("invalid PES start code")]
    InvalidPesStartCode,

    /// A reserved/invalid PTS_DTS_flags combination (0b01) was encountered.
    #[error("invalid PTS_DTS_flags value: {0:#04b}")]
    InvalidPtsDtsFlags(u8),

    /// A malformed SCTE-35 splice_info_section.
    #[error("invalid SCTE-35 data: {0}")]
    InvalidScte35(String),

    /// Generic parse failure with a descriptive message.
    #[error("parse error: {0}")]
    ParseError(String),
}
