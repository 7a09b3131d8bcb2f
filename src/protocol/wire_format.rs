//! Wire format encoding and decoding.
//!
//! Every frame starts with a 20-byte ASCII header:
//! ```text
//! ┌────────┬──────┬──────┬────────┬─────────┬─────────┬────────┬───────┬─────────┐
//! │ Length │ MID  │ Rev  │ No ack │ Station │ Spindle │ Seq no │ Parts │ Part no │
//! │ 4      │ 4    │ 3    │ 1      │ 2       │ 2       │ 2      │ 1     │ 1       │
//! └────────┴──────┴──────┴────────┴─────────┴─────────┴────────┴───────┴─────────┘
//! ```
//!
//! Numbers are zero-padded decimal. Optional fields are blank (spaces) when
//! unset; blank is distinct from zero. The length counts the whole frame,
//! including the four length digits themselves.

use crate::error::{OpenProtocolError, Result};

/// Width of the decimal length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Header size in bytes, length prefix included (fixed, exactly 20).
pub const HEADER_SIZE: usize = 20;

/// Largest frame the 4-digit length prefix can describe.
pub const MAX_FRAME_LENGTH: usize = 9999;

/// Largest MID the 4-digit field can carry.
pub const MAX_MID: u16 = 9999;

/// Largest revision the 3-digit field can carry.
pub const MAX_REVISION: u16 = 999;

/// Station and spindle id used when the field is blank.
pub const DEFAULT_STATION_ID: u8 = 1;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message identifier (MID).
    pub mid: u16,
    /// Payload revision.
    pub revision: u16,
    /// Sender does not want an acknowledge for this message.
    pub no_ack: bool,
    /// Station id (blank on the wire means 1).
    pub station_id: u8,
    /// Spindle id (blank on the wire means 1).
    pub spindle_id: u8,
    /// Sequence number, if used.
    pub sequence_number: Option<u8>,
    /// Number of message parts, if the message is split.
    pub message_parts: Option<u8>,
    /// Index of this part, if the message is split.
    pub message_part_number: Option<u8>,
}

impl Header {
    /// Create a header with every optional field at its default.
    pub fn new(mid: u16, revision: u16) -> Self {
        Self {
            mid,
            revision,
            no_ack: false,
            station_id: DEFAULT_STATION_ID,
            spindle_id: DEFAULT_STATION_ID,
            sequence_number: None,
            message_parts: None,
            message_part_number: None,
        }
    }

    /// Set the no-ack flag.
    pub fn with_no_ack(mut self, no_ack: bool) -> Self {
        self.no_ack = no_ack;
        self
    }

    /// Set the station id.
    pub fn with_station_id(mut self, station_id: u8) -> Self {
        self.station_id = station_id;
        self
    }

    /// Set the spindle id.
    pub fn with_spindle_id(mut self, spindle_id: u8) -> Self {
        self.spindle_id = spindle_id;
        self
    }

    /// Set the sequence number.
    pub fn with_sequence_number(mut self, sequence_number: u8) -> Self {
        self.sequence_number = Some(sequence_number);
        self
    }

    /// Set message part count and part number.
    pub fn with_parts(mut self, parts: u8, part_number: u8) -> Self {
        self.message_parts = Some(parts);
        self.message_part_number = Some(part_number);
        self
    }

    /// Append the 16 header characters that follow the length prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use openprotocol_client::protocol::Header;
    ///
    /// let mut out = String::new();
    /// Header::new(61, 1).encode_into(&mut out).unwrap();
    /// assert_eq!(out, "0061001         ");
    /// ```
    pub fn encode_into(&self, out: &mut String) -> Result<()> {
        if self.mid > MAX_MID {
            return Err(OpenProtocolError::Encode(format!(
                "MID {} does not fit in 4 digits",
                self.mid
            )));
        }
        if self.revision > MAX_REVISION {
            return Err(OpenProtocolError::Encode(format!(
                "Revision {} does not fit in 3 digits",
                self.revision
            )));
        }

        out.push_str(&format!("{:04}{:03}", self.mid, self.revision));
        out.push(if self.no_ack { '1' } else { ' ' });
        push_id(out, "station id", self.station_id)?;
        push_id(out, "spindle id", self.spindle_id)?;
        push_optional(out, "sequence number", self.sequence_number, 2)?;
        push_optional(out, "message parts", self.message_parts, 1)?;
        push_optional(out, "message part number", self.message_part_number, 1)?;
        Ok(())
    }

    /// Decode the 16 header characters that follow the length prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use openprotocol_client::protocol::Header;
    ///
    /// let header = Header::decode("0061005 02      ").unwrap();
    /// assert_eq!(header.mid, 61);
    /// assert_eq!(header.revision, 5);
    /// assert_eq!(header.station_id, 2);
    /// assert_eq!(header.spindle_id, 1);
    /// assert_eq!(header.sequence_number, None);
    /// ```
    pub fn decode(fields: &str) -> Result<Self> {
        let width = HEADER_SIZE - LENGTH_PREFIX_SIZE;
        if fields.len() < width || !fields.is_ascii() {
            return Err(OpenProtocolError::Framing(format!(
                "Header must be {} ASCII characters, got {:?}",
                width, fields
            )));
        }

        let mid = parse_number("MID", &fields[0..4])?.ok_or_else(|| {
            OpenProtocolError::Framing("MID field is blank".to_string())
        })?;
        // A blank revision is revision 1 on the wire.
        let revision = parse_number("revision", &fields[4..7])?.unwrap_or(1);
        let no_ack = match &fields[7..8] {
            " " | "0" => false,
            "1" => true,
            other => {
                return Err(OpenProtocolError::Framing(format!(
                    "No-ack flag must be blank, 0 or 1, got {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            mid: mid as u16,
            revision: revision as u16,
            no_ack,
            station_id: parse_number("station id", &fields[8..10])?
                .map_or(DEFAULT_STATION_ID, |v| v as u8),
            spindle_id: parse_number("spindle id", &fields[10..12])?
                .map_or(DEFAULT_STATION_ID, |v| v as u8),
            sequence_number: parse_number("sequence number", &fields[12..14])?.map(|v| v as u8),
            message_parts: parse_number("message parts", &fields[14..15])?.map(|v| v as u8),
            message_part_number: parse_number("message part number", &fields[15..16])?
                .map(|v| v as u8),
        })
    }
}

/// Parse a zero-padded decimal field. Blank yields `None`.
fn parse_number(field: &str, raw: &str) -> Result<Option<u32>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OpenProtocolError::Framing(format!(
            "Header field {} is not numeric: {:?}",
            field, raw
        )));
    }
    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|e| OpenProtocolError::Framing(format!("Header field {}: {}", field, e)))
}

/// Station and spindle ids: the default renders blank.
fn push_id(out: &mut String, field: &str, value: u8) -> Result<()> {
    if value == DEFAULT_STATION_ID {
        out.push_str("  ");
        return Ok(());
    }
    push_optional(out, field, Some(value), 2)
}

fn push_optional(out: &mut String, field: &str, value: Option<u8>, width: usize) -> Result<()> {
    match value {
        None => out.push_str(&" ".repeat(width)),
        Some(v) => {
            let rendered = format!("{:0width$}", v, width = width);
            if rendered.len() > width {
                return Err(OpenProtocolError::Encode(format!(
                    "Header field {} value {} does not fit in {} digits",
                    field, v, width
                )));
            }
            out.push_str(&rendered);
        }
    }
    Ok(())
}

/// Parse the 4-digit length prefix.
pub fn decode_length(prefix: &[u8]) -> Result<usize> {
    if prefix.len() < LENGTH_PREFIX_SIZE
        || !prefix[..LENGTH_PREFIX_SIZE].iter().all(|b| b.is_ascii_digit())
    {
        return Err(OpenProtocolError::Framing(format!(
            "Length prefix must be 4 ASCII digits, got {:?}",
            String::from_utf8_lossy(&prefix[..prefix.len().min(LENGTH_PREFIX_SIZE)])
        )));
    }
    let length = prefix[..LENGTH_PREFIX_SIZE]
        .iter()
        .fold(0usize, |acc, b| acc * 10 + (b - b'0') as usize);
    if length < HEADER_SIZE {
        return Err(OpenProtocolError::Framing(format!(
            "Declared length {} is shorter than the {}-byte header",
            length, HEADER_SIZE
        )));
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(header: &Header) -> String {
        let mut out = String::new();
        header.encode_into(&mut out).unwrap();
        out
    }

    #[test]
    fn test_header_width_is_fixed() {
        assert_eq!(encode(&Header::new(1, 1)).len(), HEADER_SIZE - LENGTH_PREFIX_SIZE);
        let full = Header::new(9999, 999)
            .with_no_ack(true)
            .with_station_id(12)
            .with_spindle_id(3)
            .with_sequence_number(7)
            .with_parts(2, 1);
        assert_eq!(encode(&full), "9999999112030721");
    }

    #[test]
    fn test_defaults_render_blank() {
        assert_eq!(encode(&Header::new(18, 1)), "0018001         ");
    }

    #[test]
    fn test_blank_fields_decode_to_defaults() {
        let header = Header::decode("0018001         ").unwrap();
        assert_eq!(header, Header::new(18, 1));
    }

    #[test]
    fn test_zero_is_not_blank() {
        let header = Header::decode("0018001   0000  ").unwrap();
        // Blank station stays default, explicit zeros are kept.
        assert_eq!(header.station_id, DEFAULT_STATION_ID);
        assert_eq!(header.spindle_id, 0);
        assert_eq!(header.sequence_number, Some(0));
        assert_eq!(header.message_parts, None);
    }

    #[test]
    fn test_blank_revision_is_one() {
        let header = Header::decode("0002            ").unwrap();
        assert_eq!(header.revision, 1);
    }

    #[test]
    fn test_decode_rejects_non_numeric() {
        let err = Header::decode("00A2001         ").unwrap_err();
        assert!(err.to_string().contains("MID"));
        assert!(Header::decode("0002001X        ").is_err());
        assert!(Header::decode("    001         ").is_err());
    }

    #[test]
    fn test_decode_too_short() {
        assert!(Header::decode("0002001").is_err());
    }

    #[test]
    fn test_encode_rejects_oversized_fields() {
        assert!(Header::new(10000, 1).encode_into(&mut String::new()).is_err());
        assert!(Header::new(1, 1000).encode_into(&mut String::new()).is_err());
        assert!(Header::new(1, 1)
            .with_station_id(100)
            .encode_into(&mut String::new())
            .is_err());
        assert!(Header::new(1, 1)
            .with_parts(10, 1)
            .encode_into(&mut String::new())
            .is_err());
    }

    #[test]
    fn test_decode_length() {
        assert_eq!(decode_length(b"0020").unwrap(), 20);
        assert_eq!(decode_length(b"0506rest").unwrap(), 506);
        assert!(decode_length(b"00a0").is_err());
        assert!(decode_length(b"001").is_err());
        assert!(decode_length(b"0019").is_err());
    }
}
