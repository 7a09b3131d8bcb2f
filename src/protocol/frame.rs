//! Frame struct with typed accessors.
//!
//! A decoded frame keeps the complete raw telegram so that payload fields
//! and header markers can be sliced by absolute byte offset.
//!
//! # Example
//!
//! ```
//! use openprotocol_client::protocol::{Frame, Header};
//!
//! let frame = Frame::new(Header::new(18, 1), "003").unwrap();
//! assert_eq!(frame.as_str(), "00230018001         003");
//!
//! let decoded = Frame::decode(frame.as_bytes()).unwrap();
//! assert_eq!(decoded.mid(), 18);
//! assert_eq!(decoded.payload(), "003");
//! ```

use std::ops::Range;

use super::wire_format::{decode_length, Header, HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_LENGTH};
use crate::error::{OpenProtocolError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: Header,
    raw: String,
}

impl Frame {
    /// Render a frame from header and payload.
    ///
    /// Fails if the payload is not ASCII or the frame would not fit the
    /// 4-digit length prefix.
    pub fn new(header: Header, payload: &str) -> Result<Self> {
        if !payload.is_ascii() {
            return Err(OpenProtocolError::Encode(format!(
                "Payload for MID {} is not ASCII",
                header.mid
            )));
        }

        let length = HEADER_SIZE + payload.len();
        if length > MAX_FRAME_LENGTH {
            return Err(OpenProtocolError::Encode(format!(
                "Frame length {} exceeds maximum {}",
                length, MAX_FRAME_LENGTH
            )));
        }

        let mut raw = String::with_capacity(length);
        raw.push_str(&format!("{:04}", length));
        header.encode_into(&mut raw)?;
        raw.push_str(payload);

        Ok(Self { header, raw })
    }

    /// Decode one frame from bytes that start with the length prefix.
    ///
    /// Exactly `length` bytes are consumed; anything after them (such as the
    /// NUL terminator controllers append) is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let length = decode_length(bytes)?;
        if bytes.len() < length {
            return Err(OpenProtocolError::Framing(format!(
                "Frame declares {} bytes but only {} are available",
                length,
                bytes.len()
            )));
        }

        let raw = std::str::from_utf8(&bytes[..length])
            .ok()
            .filter(|s| s.is_ascii())
            .ok_or_else(|| OpenProtocolError::Framing("Frame is not ASCII".to_string()))?;

        let header = Header::decode(&raw[LENGTH_PREFIX_SIZE..HEADER_SIZE])?;

        Ok(Self {
            header,
            raw: raw.to_string(),
        })
    }

    /// Get the decoded header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get the MID.
    #[inline]
    pub fn mid(&self) -> u16 {
        self.header.mid
    }

    /// Get the revision.
    #[inline]
    pub fn revision(&self) -> u16 {
        self.header.revision
    }

    /// Check if the sender asked for no acknowledge.
    #[inline]
    pub fn is_no_ack(&self) -> bool {
        self.header.no_ack
    }

    /// Payload text (everything after the 20-byte header).
    #[inline]
    pub fn payload(&self) -> &str {
        &self.raw[HEADER_SIZE..]
    }

    /// Payload length in bytes.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.raw.len() - HEADER_SIZE
    }

    /// Slice the raw frame by absolute offset (length prefix is offset 0).
    ///
    /// Returns `None` when the range falls outside the frame.
    pub fn slice(&self, range: Range<usize>) -> Option<&str> {
        self.raw.get(range)
    }

    /// The complete raw telegram.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The complete raw telegram as bytes, ready for the wire.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.raw.as_bytes()
    }

    /// Total frame length (equals the length prefix).
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Frames always carry a header, so this is never true.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Consume the frame into wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.raw.into_bytes()
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use openprotocol_client::protocol::{build_frame, Header};
///
/// let bytes = build_frame(&Header::new(1, 3), "").unwrap();
/// assert_eq!(bytes, b"00200001003         ");
/// ```
pub fn build_frame(header: &Header, payload: &str) -> Result<Vec<u8>> {
    Frame::new(*header, payload).map(Frame::into_bytes)
}
