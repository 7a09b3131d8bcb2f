//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForLength`: Need the 4-digit length prefix
//! - `WaitingForBody`: Prefix parsed, need the rest of the frame
//!
//! Controllers terminate every telegram with a NUL byte that is not counted
//! in the length; NULs between frames are skipped.
//!
//! # Example
//!
//! ```
//! use openprotocol_client::protocol::{build_frame, FrameBuffer, Header};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = build_frame(&Header::new(5, 1), "0060").unwrap();
//!
//! assert!(buffer.push(&bytes[..10]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[10..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0][..], &bytes[..]);
//! ```

use bytes::{Buf, Bytes, BytesMut};
use tracing::warn;

use super::wire_format::{decode_length, LENGTH_PREFIX_SIZE};
use crate::error::Result;

/// Telegram terminator sent by controllers after each frame.
const FRAME_TERMINATOR: u8 = 0x00;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the 4-digit length prefix.
    WaitingForLength,
    /// Length parsed, waiting until the whole frame is buffered.
    WaitingForBody { length: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new() -> Self {
        Self::with_capacity(16 * 1024)
    }

    /// Create a new frame buffer with custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForLength,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Each returned `Bytes` is one whole frame, length prefix included.
    ///
    /// A malformed length prefix drops the bytes up to and including the
    /// next NUL terminator (or everything buffered if there is none), and
    /// extraction continues after it.
    ///
    /// # Errors
    ///
    /// Returns the framing error only when no complete frame came out of this
    /// push. Otherwise the frames are returned and the skipped bytes logged.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        let mut error = None;
        loop {
            match self.try_extract_one() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    self.resync();
                    error.get_or_insert(e);
                }
            }
        }

        match error {
            Some(e) if frames.is_empty() => Err(e),
            Some(e) => {
                warn!("Skipped malformed bytes between frames: {}", e);
                Ok(frames)
            }
            None => Ok(frames),
        }
    }

    /// Drop everything up to and including the next terminator.
    fn resync(&mut self) {
        self.state = State::WaitingForLength;
        match self.buffer.iter().position(|&b| b == FRAME_TERMINATOR) {
            Some(at) => self.buffer.advance(at + 1),
            None => self.buffer.clear(),
        }
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            State::WaitingForLength => {
                let skip = self
                    .buffer
                    .iter()
                    .take_while(|&&b| b == FRAME_TERMINATOR)
                    .count();
                self.buffer.advance(skip);

                if self.buffer.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }

                let length = decode_length(&self.buffer[..LENGTH_PREFIX_SIZE])?;
                self.state = State::WaitingForBody { length };
                self.try_extract_one()
            }

            State::WaitingForBody { length } => {
                if self.buffer.len() < length {
                    return Ok(None);
                }

                let frame = self.buffer.split_to(length).freeze();
                self.state = State::WaitingForLength;
                Ok(Some(frame))
            }
        }
    }

    /// Get the current buffered byte count.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    /// Get the current state name (for debugging).
    pub fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
