//! Common test utilities: an in-process FLARM that speaks the binary protocol

#![allow(dead_code)]

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use flarm_lib::codec::{Frame, FrameDecoder};
#[allow(unused_imports)]
pub use flarm_lib::constants::END_OF_DATA;
#[allow(unused_imports)]
pub use flarm_lib::{
    BrokenDate, BrokenTime, FlarmConfig, FlarmDevice, FlarmError, MessageType, NullOperation, OperationEnvironment,
    RecordedFlightInfo, RecordedFlightList,
};

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

/// Info line as sent by firmware 5.03
pub const INFO_WITH_FILENAME: &str = "18CG6NG1.IGC|2011-08-12|12:23:48|02:03:25|TOBIAS BIENIEK|TH|Club";

/// Info line as given in the protocol documentation
pub const INFO_DOCUMENTED: &str = "2000-11-08|20:05:21|01:21:09|J.Doe|XYZ|15M";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the fake device answers requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    Normal,
    /// An ACK for some other sequence number precedes every real answer
    StaleFirst,
    /// A frame with a broken CRC precedes every real answer
    CorruptFirst,
    /// Only ever acknowledge the wrong sequence number
    StaleOnly,
}

/// A request the fake device has decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub message_type: MessageType,
    pub sequence: u16,
    pub payload: Bytes,
}

#[derive(Debug, Clone)]
pub struct FakeRecord {
    pub info: String,
    /// `GETIGCDATA` answers without the echoed sequence number:
    /// `[progress][igc data..][0x1A on the last one]`
    pub chunks: Vec<Vec<u8>>,
}

impl FakeRecord {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
            chunks: Vec::new(),
        }
    }

    pub fn with_chunk(mut self, progress: u8, data: &[u8], last: bool) -> Self {
        let mut chunk = vec![progress];
        chunk.extend_from_slice(data);
        if last {
            chunk.push(END_OF_DATA);
        }
        self.chunks.push(chunk);
        self
    }
}

pub struct FakeFlarm {
    records: Vec<FakeRecord>,
    mode: ReplyMode,
    /// Stop answering once this many `GETIGCDATA` requests have been served
    silent_after_chunks: Option<usize>,
    selected: Option<usize>,
    chunk_cursor: usize,
    chunks_served: usize,
    sequence: u16,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl FakeFlarm {
    pub fn new(records: Vec<FakeRecord>) -> Self {
        Self {
            records,
            mode: ReplyMode::Normal,
            silent_after_chunks: None,
            selected: None,
            chunk_cursor: 0,
            chunks_served: 0,
            sequence: 0x4000,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_mode(mut self, mode: ReplyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn silent_after_chunks(mut self, chunks: usize) -> Self {
        self.silent_after_chunks = Some(chunks);
        self
    }

    /// Shared log of every request the device has decoded
    pub fn requests(&self) -> Arc<Mutex<Vec<Request>>> {
        self.requests.clone()
    }

    /// Run the device on one end of an in-memory link and return the other end
    pub fn spawn(self) -> DuplexStream {
        let (host, device) = duplex(4096);
        tokio::spawn(self.run(device));
        host
    }

    /// Connect a `FlarmDevice` with default settings
    pub fn connect(self) -> (FlarmDevice<DuplexStream>, Arc<Mutex<Vec<Request>>>) {
        let requests = self.requests();
        (FlarmDevice::new(self.spawn()), requests)
    }

    async fn run(mut self, mut link: DuplexStream) {
        let mut decoder = FrameDecoder::new();
        let mut buffer = [0u8; 256];
        loop {
            let n = match link.read(&mut buffer).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            decoder.push(&buffer[..n]);
            while let Some(frame) = decoder.next_frame() {
                let Ok(frame) = frame else { continue };
                let wire = self.answer(&frame);
                if !wire.is_empty() && link.write_all(&wire).await.is_err() {
                    return;
                }
            }
        }
    }

    fn next_sequence(&mut self) -> u16 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    /// Bytes to send back for `request`, empty for no answer
    fn answer(&mut self, request: &Frame) -> Vec<u8> {
        self.requests.lock().unwrap().push(Request {
            message_type: request.message_type(),
            sequence: request.sequence_number(),
            payload: request.payload.clone(),
        });

        let Some((message_type, data)) = self.respond(request) else {
            return Vec::new();
        };

        let request_sequence = request.sequence_number();
        let mut wire = Vec::new();
        match self.mode {
            ReplyMode::Normal => {}
            ReplyMode::StaleFirst => {
                let stale = Frame::reply(self.next_sequence(), MessageType::Ack, request_sequence.wrapping_add(7), &[]);
                wire.extend_from_slice(&stale.encode());
            }
            ReplyMode::CorruptFirst => {
                let mut corrupt = Frame::reply(self.next_sequence(), message_type, request_sequence, b"junk")
                    .encode()
                    .to_vec();
                let last = corrupt.len() - 1;
                corrupt[last] ^= 0xFF;
                wire.extend_from_slice(&[0x00, 0x42]);
                wire.extend_from_slice(&corrupt);
            }
            ReplyMode::StaleOnly => {
                let stale = Frame::reply(self.next_sequence(), message_type, request_sequence.wrapping_add(1), &data);
                wire.extend_from_slice(&stale.encode());
                return wire;
            }
        }

        let reply = Frame::reply(self.next_sequence(), message_type, request_sequence, &data);
        wire.extend_from_slice(&reply.encode());
        wire
    }

    fn respond(&mut self, request: &Frame) -> Option<(MessageType, Vec<u8>)> {
        match request.message_type() {
            MessageType::Ping => Some((MessageType::Ack, Vec::new())),
            MessageType::SelectRecord => {
                let index = *request.payload.first()? as usize;
                if index < self.records.len() {
                    self.selected = Some(index);
                    self.chunk_cursor = 0;
                    Some((MessageType::Ack, Vec::new()))
                } else {
                    Some((MessageType::Nack, Vec::new()))
                }
            }
            MessageType::GetRecordInfo => match self.selected {
                Some(index) => {
                    let mut text = self.records[index].info.clone().into_bytes();
                    text.push(0);
                    Some((MessageType::Ack, text))
                }
                None => Some((MessageType::Nack, Vec::new())),
            },
            MessageType::GetIgcData => {
                if self.silent_after_chunks.is_some_and(|limit| self.chunks_served >= limit) {
                    return None;
                }
                self.chunks_served += 1;
                let chunk = self
                    .selected
                    .and_then(|index| self.records[index].chunks.get(self.chunk_cursor).cloned());
                match chunk {
                    Some(chunk) => {
                        self.chunk_cursor += 1;
                        Some((MessageType::Ack, chunk))
                    }
                    None => Some((MessageType::Nack, Vec::new())),
                }
            }
            _ => None,
        }
    }
}

/// Environment recording everything the driver reports
#[derive(Debug, Default)]
pub struct RecordingOperation {
    pub ranges: Vec<u32>,
    pub positions: Vec<u32>,
    /// Flip to cancelled once this many positions have been reported
    pub cancel_after_positions: Option<usize>,
    pub cancelled: bool,
}

impl RecordingOperation {
    pub fn cancel_after(positions: usize) -> Self {
        Self {
            cancel_after_positions: Some(positions),
            ..Self::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }
}

impl OperationEnvironment for RecordingOperation {
    fn set_progress_range(&mut self, range: u32) {
        self.ranges.push(range);
    }

    fn set_progress_position(&mut self, position: u32) {
        self.positions.push(position);
        if self.cancel_after_positions == Some(self.positions.len()) {
            self.cancelled = true;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
