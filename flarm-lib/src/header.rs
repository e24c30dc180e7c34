use crate::constants::{HEADER_CRC_SPAN, HEADER_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::error::FrameError;
use crate::message::MessageType;
use crc::{CRC_16_XMODEM, Crc};
use num_enum::FromPrimitive;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// CRC-16/CCITT with a zero seed, as computed by FLARM firmware
const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// FLARM frame header (8 bytes, little-endian)
///
/// `length` counts the header itself plus the payload. The CRC covers the
/// first six header bytes followed by the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    length: U16,
    version: u8,
    sequence_number: U16,
    message_type: u8,
    crc: U16,
}

impl FrameHeader {
    /// Build a header for `payload`, filling in length and CRC.
    ///
    /// `payload` must not exceed [`MAX_PAYLOAD_SIZE`]; the length field of a
    /// longer one saturates at `u16::MAX`. Use [`FrameHeader::try_new`] for
    /// payloads of unknown size.
    pub fn new(sequence_number: u16, message_type: MessageType, payload: &[u8]) -> Self {
        let length = u16::try_from(HEADER_SIZE + payload.len()).unwrap_or(u16::MAX);
        Self::with_length(sequence_number, message_type, payload, length)
    }

    /// Like [`FrameHeader::new`], but rejects payloads the length field cannot describe
    pub fn try_new(sequence_number: u16, message_type: MessageType, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        let length = (HEADER_SIZE + payload.len()) as u16;
        Ok(Self::with_length(sequence_number, message_type, payload, length))
    }

    fn with_length(sequence_number: u16, message_type: MessageType, payload: &[u8], length: u16) -> Self {
        let mut header = Self {
            length: U16::new(length),
            version: PROTOCOL_VERSION,
            sequence_number: U16::new(sequence_number),
            message_type: message_type.into(),
            crc: U16::new(0),
        };
        header.crc = U16::new(calculate_crc(&header, payload));
        header
    }

    /// Parse a header from exactly `HEADER_SIZE` de-escaped bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Self::read_from_bytes(bytes).map_err(|_| FrameError::TooShort)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(self.as_bytes());
        bytes
    }

    pub fn length(&self) -> u16 {
        self.length.get()
    }

    /// Number of payload bytes announced by the header, if the length is sane
    pub fn payload_length(&self) -> Result<usize, FrameError> {
        (self.length() as usize)
            .checked_sub(HEADER_SIZE)
            .ok_or(FrameError::InvalidLength(self.length()))
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number.get()
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from_primitive(self.message_type)
    }

    pub fn crc(&self) -> u16 {
        self.crc.get()
    }

    /// Check the header CRC against the received payload
    pub fn verify(&self, payload: &[u8]) -> Result<(), FrameError> {
        let actual = calculate_crc(self, payload);
        if actual != self.crc() {
            return Err(FrameError::ChecksumMismatch {
                expected: self.crc(),
                actual,
            });
        }
        Ok(())
    }
}

/// CRC over the first six header bytes and the payload
pub fn calculate_crc(header: &FrameHeader, payload: &[u8]) -> u16 {
    let mut digest = FRAME_CRC.digest();
    digest.update(&header.as_bytes()[..HEADER_CRC_SPAN]);
    digest.update(payload);
    digest.finalize()
}
