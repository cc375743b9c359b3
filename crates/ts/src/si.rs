//! Service Description Table (SDT) and Event Information Table (EIT) parsing.
//!
//! SDT carries the `service_name` shown to viewers (PID 0x0011, table_id 0x42/0x46).
//! EIT carries the current/following event's `event_name` (PID 0x0012, table_id
//! 0x4E-0x51). Both embed their text fields in DVB's codepage-prefixed string
//! encoding (ETSI EN 300 468 Annex A), decoded here via `encoding_rs`.

use crate::descriptor::{DescriptorIterator, TAG_SERVICE, TAG_SHORT_EVENT};
use crate::pat::validate_crc;
use crate::{Result, TsError};
use bytes::{Buf, Bytes};

/// PID carrying the SDT (actual and other transport streams).
pub const PID_SDT: u16 = 0x0011;
/// PID carrying the EIT (present/following and schedule events).
pub const PID_EIT: u16 = 0x0012;

/// table_id for SDT describing the actual transport stream.
pub const TABLE_ID_SDT_ACTUAL: u8 = 0x42;
/// table_id for SDT describing other transport streams.
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;
/// First table_id in the EIT present/following + schedule range.
pub const TABLE_ID_EIT_MIN: u8 = 0x4E;
/// Last table_id in the EIT present/following + schedule range.
pub const TABLE_ID_EIT_MAX: u8 = 0x51;

/// Decode a DVB-encoded text field into a `String`, never failing.
///
/// A leading control byte below 0x20 selects the character table: 0x01-0x05
/// select ISO/IEC 8859-5 through 8859-9(via windows-1254), 0x15 selects UTF-8.
/// With no control byte the default DVB Latin alphabet is closest to ISO/IEC
/// 8859-1, but in practice most modern muxes emit plain UTF-8, so we decode
/// the remainder as UTF-8 and fall back to the Unicode replacement character
/// for any byte sequence that isn't valid, rather than erroring.
pub fn decode_dvb_string(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }

    let (encoding, rest): (&'static encoding_rs::Encoding, &[u8]) = match data[0] {
        0x01 => (encoding_rs::ISO_8859_5, &data[1..]),
        0x02 => (encoding_rs::ISO_8859_6, &data[1..]),
        0x03 => (encoding_rs::ISO_8859_7, &data[1..]),
        0x04 => (encoding_rs::ISO_8859_8, &data[1..]),
        0x05 => (encoding_rs::WINDOWS_1254, &data[1..]),
        0x15 => (encoding_rs::UTF_8, &data[1..]),
        b if b < 0x20 => (encoding_rs::UTF_8, &data[1..]),
        _ => (encoding_rs::UTF_8, data),
    };

    let (decoded, _, _had_errors) = encoding.decode(rest);
    decoded.into_owned()
}

/// A single service entry in an SDT section.
#[derive(Debug, Clone)]
pub struct SdtService {
    pub service_id: u16,
    pub eit_schedule_flag: bool,
    pub eit_present_following_flag: bool,
    pub running_status: u8,
    pub free_ca_mode: bool,
    /// Decoded `service_name` from the service descriptor (tag 0x48), if present.
    pub service_name: Option<String>,
    /// Decoded `service_provider_name` from the service descriptor, if present.
    pub provider_name: Option<String>,
}

/// Owned, fully parsed Service Description Table section.
#[derive(Debug, Clone)]
pub struct Sdt {
    pub table_id: u8,
    pub transport_stream_id: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub original_network_id: u16,
    pub services: Vec<SdtService>,
}

impl Sdt {
    /// Parse an SDT from a reassembled PSI section (pointer field already removed).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 11 {
            return Err(TsError::InsufficientData {
                expected: 11,
                actual: data.len(),
            });
        }

        let mut reader = data;
        let table_id = reader.get_u8();
        if table_id != TABLE_ID_SDT_ACTUAL && table_id != TABLE_ID_SDT_OTHER {
            return Err(TsError::InvalidTableId {
                expected: TABLE_ID_SDT_ACTUAL,
                actual: table_id,
            });
        }

        let byte1 = reader.get_u8();
        let section_length = ((byte1 as u16 & 0x0F) << 8) | reader.get_u8() as u16;
        if section_length < 8 {
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
        let _section_number = reader.get_u8();
        let _last_section_number = reader.get_u8();
        let original_network_id = reader.get_u16();
        let _reserved_future_use = reader.get_u8();

        let services_end = 3 + section_length as usize - 4; // exclude trailing CRC32
        let mut services = Vec::new();
        let mut offset = 11;
        while offset + 5 <= services_end {
            let service_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let byte2 = data[offset + 2];
            let eit_schedule_flag = (byte2 & 0x02) != 0;
            let eit_present_following_flag = (byte2 & 0x01) != 0;
            let byte3 = data[offset + 3];
            let running_status = (byte3 >> 5) & 0x07;
            let free_ca_mode = (byte3 & 0x10) != 0;
            let descriptors_loop_length =
                (((byte3 as u16) & 0x0F) << 8) | data[offset + 4] as u16;
            let descriptors_loop_length = descriptors_loop_length as usize;

            let descriptors_start = offset + 5;
            let descriptors_end = descriptors_start + descriptors_loop_length;
            if descriptors_end > services_end {
                return Err(TsError::InsufficientData {
                    expected: descriptors_end,
                    actual: services_end,
                });
            }

            let descriptors =
                Bytes::copy_from_slice(&data[descriptors_start..descriptors_end]);
            let mut service_name = None;
            let mut provider_name = None;
            for descriptor in DescriptorIterator::new(descriptors) {
                if descriptor.tag == TAG_SERVICE {
                    if let Some((provider, name)) = parse_service_descriptor(&descriptor.data) {
                        provider_name = Some(provider);
                        service_name = Some(name);
                    }
                }
            }

            services.push(SdtService {
                service_id,
                eit_schedule_flag,
                eit_present_following_flag,
                running_status,
                free_ca_mode,
                service_name,
                provider_name,
            });

            offset = descriptors_end;
        }

        Ok(Sdt {
            table_id,
            transport_stream_id,
            version_number,
            current_next_indicator,
            original_network_id,
            services,
        })
    }

    /// Parse an SDT section, validating its trailing CRC-32/MPEG-2 first.
    pub fn parse_with_crc(data: &[u8]) -> Result<Self> {
        validate_crc(data)?;
        Self::parse(data)
    }
}

/// Parse a service descriptor (tag 0x48): `(provider_name, service_name)`.
fn parse_service_descriptor(data: &[u8]) -> Option<(String, String)> {
    if data.len() < 2 {
        return None;
    }
    let _service_type = data[0];
    let provider_name_length = data[1] as usize;
    let provider_start = 2;
    let provider_end = provider_start + provider_name_length;
    if provider_end + 1 > data.len() {
        return None;
    }
    let provider_name = decode_dvb_string(&data[provider_start..provider_end]);

    let service_name_length = data[provider_end] as usize;
    let name_start = provider_end + 1;
    let name_end = name_start + service_name_length;
    if name_end > data.len() {
        return None;
    }
    let service_name = decode_dvb_string(&data[name_start..name_end]);

    Some((provider_name, service_name))
}

/// A single event entry in an EIT section.
#[derive(Debug, Clone)]
pub struct EitEvent {
    pub event_id: u16,
    pub running_status: u8,
    pub free_ca_mode: bool,
    /// Decoded `event_name` from the short event descriptor (tag 0x4D), if present.
    pub event_name: Option<String>,
    /// Decoded `text` (short description) from the short event descriptor, if present.
    pub event_text: Option<String>,
}

/// Owned, fully parsed Event Information Table section.
#[derive(Debug, Clone)]
pub struct Eit {
    pub table_id: u8,
    pub service_id: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub events: Vec<EitEvent>,
}

impl Eit {
    /// True for table_ids in the EIT present/following + schedule range (0x4E-0x51).
    pub fn is_eit_table_id(table_id: u8) -> bool {
        (TABLE_ID_EIT_MIN..=TABLE_ID_EIT_MAX).contains(&table_id)
    }

    /// Parse an EIT from a reassembled PSI section (pointer field already removed).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 14 {
            return Err(TsError::InsufficientData {
                expected: 14,
                actual: data.len(),
            });
        }

        let mut reader = data;
        let table_id = reader.get_u8();
        if !Self::is_eit_table_id(table_id) {
            return Err(TsError::InvalidTableId {
                expected: TABLE_ID_EIT_MIN,
                actual: table_id,
            });
        }

        let byte1 = reader.get_u8();
        let section_length = ((byte1 as u16 & 0x0F) << 8) | reader.get_u8() as u16;
        if section_length < 11 {
            return Err(TsError::InvalidSectionLength(section_length));
        }
        if data.len() < (3 + section_length as usize) {
            return Err(TsError::InsufficientData {
                expected: 3 + section_length as usize,
                actual: data.len(),
            });
        }

        let service_id = reader.get_u16();
        let byte5 = reader.get_u8();
        let version_number = (byte5 >> 1) & 0x1F;
        let current_next_indicator = (byte5 & 0x01) != 0;
        let _section_number = reader.get_u8();
        let _last_section_number = reader.get_u8();
        let transport_stream_id = reader.get_u16();
        let original_network_id = reader.get_u16();
        let _segment_last_section_number = reader.get_u8();
        let _last_table_id = reader.get_u8();

        let events_end = 3 + section_length as usize - 4; // exclude trailing CRC32
        let mut events = Vec::new();
        let mut offset = 14;
        while offset + 12 <= events_end {
            let event_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            // bytes [offset+2..offset+9] hold start_time (5) and duration (3), not needed here
            let byte11 = data[offset + 10];
            let running_status = (byte11 >> 5) & 0x07;
            let free_ca_mode = (byte11 & 0x10) != 0;
            let descriptors_loop_length = (((byte11 as u16) & 0x0F) << 8) | data[offset + 11] as u16;
            let descriptors_loop_length = descriptors_loop_length as usize;

            let descriptors_start = offset + 12;
            let descriptors_end = descriptors_start + descriptors_loop_length;
            if descriptors_end > events_end {
                return Err(TsError::InsufficientData {
                    expected: descriptors_end,
                    actual: events_end,
                });
            }

            let descriptors =
                Bytes::copy_from_slice(&data[descriptors_start..descriptors_end]);
            let mut event_name = None;
            let mut event_text = None;
            for descriptor in DescriptorIterator::new(descriptors) {
                if descriptor.tag == TAG_SHORT_EVENT {
                    if let Some((name, text)) = parse_short_event_descriptor(&descriptor.data) {
                        event_name = Some(name);
                        event_text = Some(text);
                    }
                }
            }

            events.push(EitEvent {
                event_id,
                running_status,
                free_ca_mode,
                event_name,
                event_text,
            });

            offset = descriptors_end;
        }

        Ok(Eit {
            table_id,
            service_id,
            version_number,
            current_next_indicator,
            transport_stream_id,
            original_network_id,
            events,
        })
    }

    /// Parse an EIT section, validating its trailing CRC-32/MPEG-2 first.
    pub fn parse_with_crc(data: &[u8]) -> Result<Self> {
        validate_crc(data)?;
        Self::parse(data)
    }
}

/// Parse a short event descriptor (tag 0x4D): `(event_name, text)`.
fn parse_short_event_descriptor(data: &[u8]) -> Option<(String, String)> {
    if data.len() < 4 {
        return None;
    }
    // 3-byte ISO 639 language code at data[0..3] is intentionally skipped.
    let event_name_length = data[3] as usize;
    let name_start = 4;
    let name_end = name_start + event_name_length;
    if name_end + 1 > data.len() {
        return None;
    }
    let event_name = decode_dvb_string(&data[name_start..name_end]);

    let text_length = data[name_end] as usize;
    let text_start = name_end + 1;
    let text_end = text_start + text_length;
    if text_end > data.len() {
        return None;
    }
    let text = decode_dvb_string(&data[text_start..text_end]);

    Some((event_name, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_utf8_with_no_control_byte() {
        assert_eq!(decode_dvb_string(b"BBC One"), "BBC One");
    }

    #[test]
    fn decodes_explicit_utf8_control_byte() {
        let mut data = vec![0x15];
        data.extend_from_slice("Canal+".as_bytes());
        assert_eq!(decode_dvb_string(&data), "Canal+");
    }

    #[test]
    fn empty_string_decodes_to_empty() {
        assert_eq!(decode_dvb_string(&[]), "");
    }

    fn sample_sdt_bytes() -> Vec<u8> {
        // service descriptor: type=0x01, provider_len=4 "Demo", name_len=5 "Chan1"
        let mut service_descriptor = vec![0x01, 0x04];
        service_descriptor.extend_from_slice(b"Demo");
        service_descriptor.push(0x05);
        service_descriptor.extend_from_slice(b"Chan1");

        let mut descriptor_loop = vec![TAG_SERVICE, service_descriptor.len() as u8];
        descriptor_loop.extend_from_slice(&service_descriptor);

        let service_id: u16 = 101;
        let mut service_entry = vec![];
        service_entry.extend_from_slice(&service_id.to_be_bytes());
        service_entry.push(0x03); // eit_schedule=1, eit_pf=1
        let loop_len = descriptor_loop.len() as u16;
        service_entry.push(0x20 | ((loop_len >> 8) as u8 & 0x0F)); // running_status=1, free_ca=0
        service_entry.push((loop_len & 0xFF) as u8);
        service_entry.extend_from_slice(&descriptor_loop);

        let section_length = 8 + service_entry.len() + 4;
        let mut data = vec![
            TABLE_ID_SDT_ACTUAL,
            0xF0 | ((section_length >> 8) as u8 & 0x0F),
            (section_length & 0xFF) as u8,
        ];
        data.extend_from_slice(&[0x00, 0x01]); // transport_stream_id
        data.push(0xC1); // version/current_next
        data.push(0x00); // section_number
        data.push(0x00); // last_section_number
        data.extend_from_slice(&[0x00, 0x01]); // original_network_id
        data.push(0xFF); // reserved
        data.extend_from_slice(&service_entry);
        data.extend_from_slice(&[0, 0, 0, 0]); // fake CRC
        data
    }

    #[test]
    fn parses_sdt_service_name() {
        let data = sample_sdt_bytes();
        let sdt = Sdt::parse(&data).unwrap();
        assert_eq!(sdt.services.len(), 1);
        let service = &sdt.services[0];
        assert_eq!(service.service_id, 101);
        assert_eq!(service.service_name.as_deref(), Some("Chan1"));
        assert_eq!(service.provider_name.as_deref(), Some("Demo"));
    }

    #[test]
    fn rejects_wrong_sdt_table_id() {
        let mut data = sample_sdt_bytes();
        data[0] = 0x00;
        assert!(Sdt::parse(&data).is_err());
    }

    fn sample_eit_bytes() -> Vec<u8> {
        // short event descriptor: lang "eng", name_len=5 "Show1", text_len=4 "Demo"
        let mut short_event = vec![b'e', b'n', b'g', 0x05];
        short_event.extend_from_slice(b"Show1");
        short_event.push(0x04);
        short_event.extend_from_slice(b"Demo");

        let mut descriptor_loop = vec![TAG_SHORT_EVENT, short_event.len() as u8];
        descriptor_loop.extend_from_slice(&short_event);

        let event_id: u16 = 55;
        let mut event_entry = vec![];
        event_entry.extend_from_slice(&event_id.to_be_bytes());
        event_entry.extend_from_slice(&[0u8; 5]); // start_time
        event_entry.extend_from_slice(&[0u8; 3]); // duration
        let loop_len = descriptor_loop.len() as u16;
        event_entry.push(0x20 | ((loop_len >> 8) as u8 & 0x0F)); // running_status=1
        event_entry.push((loop_len & 0xFF) as u8);
        event_entry.extend_from_slice(&descriptor_loop);

        let section_length = 11 + event_entry.len() + 4;
        let mut data = vec![
            TABLE_ID_EIT_MIN,
            0xF0 | ((section_length >> 8) as u8 & 0x0F),
            (section_length & 0xFF) as u8,
        ];
        data.extend_from_slice(&[0x00, 0x65]); // service_id
        data.push(0xC1); // version/current_next
        data.push(0x00); // section_number
        data.push(0x00); // last_section_number
        data.extend_from_slice(&[0x00, 0x01]); // transport_stream_id
        data.extend_from_slice(&[0x00, 0x01]); // original_network_id
        data.push(0x00); // segment_last_section_number
        data.push(TABLE_ID_EIT_MIN); // last_table_id
        data.extend_from_slice(&event_entry);
        data.extend_from_slice(&[0, 0, 0, 0]); // fake CRC
        data
    }

    #[test]
    fn parses_eit_event_name() {
        let data = sample_eit_bytes();
        let eit = Eit::parse(&data).unwrap();
        assert_eq!(eit.events.len(), 1);
        let event = &eit.events[0];
        assert_eq!(event.event_id, 55);
        assert_eq!(event.event_name.as_deref(), Some("Show1"));
        assert_eq!(event.event_text.as_deref(), Some("Demo"));
    }

    #[test]
    fn rejects_wrong_eit_table_id() {
        let mut data = sample_eit_bytes();
        data[0] = 0x00;
        assert!(Eit::parse(&data).is_err());
    }
}
