//! Byte stuffing and frame (de)serialization for the FLARM binary protocol.
//!
//! Wire layout of a frame:
//!
//! ```text
//! [0x73][escaped 8-byte header][escaped payload]
//! ```
//!
//! Inside header and payload the reserved bytes are stuffed:
//! `0x73 -> 0x78 0x31` and `0x78 -> 0x78 0x55`. A raw `0x73` therefore
//! only ever appears at the start of a frame, which lets the receiver
//! resynchronize after noise or a truncated frame.

use crate::constants::{ACK_SEQUENCE_SIZE, ESCAPE_BYTE, ESCAPED_ESCAPE, ESCAPED_START, HEADER_SIZE, START_BYTE};
use crate::error::FrameError;
use crate::header::FrameHeader;
use crate::message::MessageType;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;

/// Append `data` to `out`, escaping reserved bytes
pub fn escape_into(data: &[u8], out: &mut BytesMut) {
    out.reserve(data.len());
    for &byte in data {
        match byte {
            START_BYTE => out.put_slice(&[ESCAPE_BYTE, ESCAPED_START]),
            ESCAPE_BYTE => out.put_slice(&[ESCAPE_BYTE, ESCAPED_ESCAPE]),
            _ => out.put_u8(byte),
        }
    }
}

pub fn escape(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len());
    escape_into(data, &mut out);
    out.freeze()
}

/// Reverse `escape`. A raw start byte or a dangling escape is an error.
pub fn unescape(data: &[u8]) -> Result<Bytes, FrameError> {
    let mut out = BytesMut::with_capacity(data.len());
    let mut bytes = data.iter();
    while let Some(&byte) = bytes.next() {
        match byte {
            START_BYTE => return Err(FrameError::UnexpectedStartByte),
            ESCAPE_BYTE => match bytes.next() {
                Some(&ESCAPED_START) => out.put_u8(START_BYTE),
                Some(&ESCAPED_ESCAPE) => out.put_u8(ESCAPE_BYTE),
                Some(&other) => return Err(FrameError::InvalidEscape(other)),
                None => return Err(FrameError::TooShort),
            },
            _ => out.put_u8(byte),
        }
    }
    Ok(out.freeze())
}

/// A complete, de-escaped frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(sequence_number: u16, message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: FrameHeader::new(sequence_number, message_type, &payload),
            payload,
        }
    }

    /// Build an ACK/NACK answering `request_sequence`, followed by `data`
    pub fn reply(sequence_number: u16, message_type: MessageType, request_sequence: u16, data: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(ACK_SEQUENCE_SIZE + data.len());
        payload.put_u16_le(request_sequence);
        payload.put_slice(data);
        Self::new(sequence_number, message_type, payload.freeze())
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type()
    }

    pub fn sequence_number(&self) -> u16 {
        self.header.sequence_number()
    }

    /// Sequence number of the request an ACK/NACK refers to
    pub fn acknowledged_sequence(&self) -> Option<u16> {
        let bytes: [u8; ACK_SEQUENCE_SIZE] = self.payload.get(..ACK_SEQUENCE_SIZE)?.try_into().ok()?;
        Some(u16::from_le_bytes(bytes))
    }

    /// Serialize as start byte + escaped header + escaped payload
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(1 + HEADER_SIZE + self.payload.len());
        out.put_u8(START_BYTE);
        escape_into(&self.header.to_bytes(), &mut out);
        escape_into(&self.payload, &mut out);
        out.freeze()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Discarding bytes until the next start byte
    Idle,
    Header,
    Payload { header: FrameHeader, length: usize },
}

/// Incremental frame decoder for the receiving side.
///
/// Bytes are fed with [`FrameDecoder::push`]; finished frames, and frames
/// that turned out malformed, are queued and taken with
/// [`FrameDecoder::next_frame`].
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buffer: BytesMut,
    escaped: bool,
    ready: VecDeque<Result<Frame, FrameError>>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
            buffer: BytesMut::with_capacity(256),
            escaped: false,
            ready: VecDeque::new(),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        for &byte in data {
            self.push_byte(byte);
        }
    }

    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        self.ready.pop_front()
    }

    /// Drop any partial frame and everything queued
    pub fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.buffer.clear();
        self.escaped = false;
        self.ready.clear();
    }

    fn push_byte(&mut self, byte: u8) {
        if byte == START_BYTE {
            if self.state != DecodeState::Idle {
                self.ready.push_back(Err(FrameError::UnexpectedStartByte));
            }
            self.buffer.clear();
            self.escaped = false;
            self.state = DecodeState::Header;
            return;
        }

        if self.state == DecodeState::Idle {
            return;
        }

        let byte = if self.escaped {
            self.escaped = false;
            match byte {
                ESCAPED_START => START_BYTE,
                ESCAPED_ESCAPE => ESCAPE_BYTE,
                other => return self.fail(FrameError::InvalidEscape(other)),
            }
        } else if byte == ESCAPE_BYTE {
            self.escaped = true;
            return;
        } else {
            byte
        };

        self.buffer.put_u8(byte);
        self.advance();
    }

    fn advance(&mut self) {
        match self.state {
            DecodeState::Idle => {}
            DecodeState::Header => {
                if self.buffer.len() < HEADER_SIZE {
                    return;
                }
                let header = match FrameHeader::from_bytes(&self.buffer) {
                    Ok(header) => header,
                    Err(e) => return self.fail(e),
                };
                self.buffer.clear();
                match header.payload_length() {
                    Ok(0) => self.complete(header),
                    Ok(length) => self.state = DecodeState::Payload { header, length },
                    Err(e) => self.fail(e),
                }
            }
            DecodeState::Payload { header, length } => {
                if self.buffer.len() == length {
                    self.complete(header);
                }
            }
        }
    }

    fn complete(&mut self, header: FrameHeader) {
        let payload = self.buffer.split().freeze();
        self.state = DecodeState::Idle;
        let frame = header.verify(&payload).map(|()| Frame { header, payload });
        self.ready.push_back(frame);
    }

    fn fail(&mut self, error: FrameError) {
        self.ready.push_back(Err(error));
        self.buffer.clear();
        self.escaped = false;
        self.state = DecodeState::Idle;
    }
}
