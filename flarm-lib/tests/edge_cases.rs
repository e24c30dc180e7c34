//! Tests for edge cases of the frame codec

mod common;

use common::*;
use flarm_lib::codec::{escape, unescape};
use flarm_lib::constants::{ESCAPE_BYTE, START_BYTE};
use flarm_lib::error::FrameError;

#[test]
fn test_escape_is_reversible_for_every_byte() {
    let all: Vec<u8> = (0..=u8::MAX).collect();
    let escaped = escape(&all);

    assert_eq!(escaped.len(), all.len() + 2, "Exactly two bytes need stuffing");
    assert!(!escaped.contains(&START_BYTE));
    assert_eq!(unescape(&escaped).unwrap().as_ref(), all.as_slice());
}

#[test]
fn test_stuffing_pairs_on_the_wire() {
    assert_eq!(escape(&[START_BYTE, ESCAPE_BYTE]).as_ref(), &[0x78, 0x31, 0x78, 0x55]);

    // Sequence number 0x7873 puts both reserved bytes into the header
    let wire = Frame::new(0x7873, MessageType::Ping, Bytes::new()).encode();
    assert_eq!(&wire[..8], &[START_BYTE, 0x08, 0x00, 0x00, 0x78, 0x31, 0x78, 0x55]);
}

#[test]
fn test_decoder_handles_any_split() {
    let frames = vec![
        Frame::reply(0x73, MessageType::Ack, 0x78, &[START_BYTE, ESCAPE_BYTE, START_BYTE]),
        Frame::reply(0x74, MessageType::Nack, 0x79, &[]),
        Frame::new(0x75, MessageType::GetIgcData, Bytes::new()),
    ];
    let wire: Vec<u8> = frames.iter().flat_map(|f| f.encode().to_vec()).collect();

    for split in 1..wire.len() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&wire[..split]);
        decoder.push(&wire[split..]);

        let decoded: Vec<Frame> = std::iter::from_fn(|| decoder.next_frame())
            .map(|f| f.expect("valid frame"))
            .collect();
        assert_eq!(decoded, frames, "Split at {} broke decoding", split);
    }
}

#[test]
fn test_decoder_rejects_invalid_escape() {
    let mut wire = Frame::reply(1, MessageType::Ack, 1, b"ok").encode().to_vec();
    wire.insert(3, ESCAPE_BYTE);
    wire.insert(4, 0x00);

    let mut decoder = FrameDecoder::new();
    decoder.push(&wire);
    assert_eq!(decoder.next_frame(), Some(Err(FrameError::InvalidEscape(0x00))));
    // The rest of the broken frame is discarded until the next start byte
    assert!(decoder.next_frame().is_none());

    decoder.push(&Frame::reply(2, MessageType::Ack, 2, &[]).encode());
    let frame = decoder.next_frame().unwrap().unwrap();
    assert_eq!(frame.acknowledged_sequence(), Some(2));
}

#[test]
fn test_reset_drops_partial_frame() {
    let wire = Frame::reply(1, MessageType::Ack, 1, b"abc").encode();

    let mut decoder = FrameDecoder::new();
    decoder.push(&wire[..4]);
    decoder.reset();
    decoder.push(&wire[4..]);
    assert!(decoder.next_frame().is_none());

    decoder.push(&wire);
    assert!(decoder.next_frame().unwrap().is_ok());
}
