//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the ASCII framing of Open Protocol:
//! - 20-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors and absolute slicing

mod frame;
mod frame_buffer;
mod proptest;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    decode_length, Header, DEFAULT_STATION_ID, HEADER_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_LENGTH,
    MAX_MID, MAX_REVISION,
};
