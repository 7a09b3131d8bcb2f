//! Property-based tests for the framing layer.
//!
//! These tests use proptest to verify:
//! - Header and payload survive a build/decode cycle
//! - Frame reassembly does not depend on how the stream is chunked
//! - Decoders never panic on arbitrary input

#![cfg(test)]

use proptest::prelude::*;

use crate::message::tightening::tests::rev1_payload;
use crate::message::{OpenProtocolMessage, TighteningResult};
use crate::protocol::{build_frame, Frame, FrameBuffer, Header};

// =============================================================================
// Arbitrary Generators
// =============================================================================

prop_compose! {
    fn arb_header()(
        mid in 1u16..=9999,
        revision in 1u16..=999,
        no_ack in any::<bool>(),
        station_id in 1u8..=99,
        spindle_id in 1u8..=99,
        sequence_number in prop::option::of(0u8..=99),
        parts in prop::option::of((0u8..=9, 0u8..=9)),
    ) -> Header {
        let mut header = Header::new(mid, revision)
            .with_no_ack(no_ack)
            .with_station_id(station_id)
            .with_spindle_id(spindle_id);
        header.sequence_number = sequence_number;
        if let Some((count, number)) = parts {
            header = header.with_parts(count, number);
        }
        header
    }
}

fn arb_payload() -> impl Strategy<Value = String> {
    "[ -~]{0,200}"
}

/// Split `bytes` at the given cut points.
fn chunk(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(bytes[start..point].to_vec());
        start = point;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_frame_roundtrip(header in arb_header(), payload in arb_payload()) {
        let bytes = build_frame(&header, &payload).unwrap();
        prop_assert_eq!(bytes.len(), 20 + payload.len());

        let frame = Frame::decode(&bytes).unwrap();
        prop_assert_eq!(frame.header(), &header);
        prop_assert_eq!(frame.payload(), payload.as_str());
    }

    #[test]
    fn prop_reassembly_ignores_chunking(
        frames in prop::collection::vec((arb_header(), arb_payload()), 1..8),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
        terminated in any::<bool>(),
    ) {
        let mut stream = Vec::new();
        let mut expected = Vec::new();
        for (header, payload) in &frames {
            let bytes = build_frame(header, payload).unwrap();
            stream.extend_from_slice(&bytes);
            if terminated {
                stream.push(0);
            }
            expected.push(bytes);
        }

        let mut buffer = FrameBuffer::new();
        let mut got = Vec::new();
        for piece in chunk(&stream, &cuts) {
            for frame in buffer.push(&piece).unwrap() {
                got.push(frame.to_vec());
            }
        }

        prop_assert_eq!(got, expected);
        prop_assert!(buffer.is_empty());
    }

    #[test]
    fn prop_truncated_tightening_still_decodes(len in 0usize..=175) {
        let payload = rev1_payload();
        let frame = Frame::new(Header::new(61, 1), &payload[..len]).unwrap();
        prop_assert!(TighteningResult::from_frame(&frame).is_ok());
    }

    #[test]
    fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Frame::decode(&bytes);
        let _ = FrameBuffer::new().push(&bytes);
    }

    #[test]
    fn prop_header_decode_never_panics(fields in ".{0,20}") {
        let _ = Header::decode(&fields);
    }
}
