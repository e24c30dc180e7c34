use crate::message::MessageType;
use std::io;
use thiserror::Error;

/// The primary error type for the `flarm-lib` library.
#[derive(Error, Debug)]
pub enum FlarmError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout waiting for the device: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Serial link closed by the device")]
    ConnectionClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unexpected response: {0:?}")]
    UnexpectedResponse(MessageType),

    #[error("Invalid record info: {0}")]
    InvalidRecordInfo(String),

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),
}

impl FlarmError {
    /// True for the errors that end a wait without any valid reply.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FlarmError::Timeout(_))
    }
}

/// Reasons a received frame is rejected by the decoder.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame truncated")]
    TooShort,

    #[error("header length {0} is smaller than the header itself")]
    InvalidLength(u16),

    #[error("payload of {0} bytes does not fit a frame")]
    PayloadTooLarge(usize),

    #[error("escape byte followed by {0:#04x}")]
    InvalidEscape(u8),

    #[error("start byte inside a frame")]
    UnexpectedStartByte,

    #[error("CRC mismatch: header {expected:#06x}, computed {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
}
