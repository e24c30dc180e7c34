// Protocol constants for the FLARM binary protocol

use std::time::Duration;

/// Synchronization byte that opens every frame
pub const START_BYTE: u8 = 0x73;

/// Escape byte used for byte stuffing
pub const ESCAPE_BYTE: u8 = 0x78;

/// Second byte of the escape sequence standing for `START_BYTE`
pub const ESCAPED_START: u8 = 0x31;

/// Second byte of the escape sequence standing for `ESCAPE_BYTE`
pub const ESCAPED_ESCAPE: u8 = 0x55;

/// Size of the frame header (8 bytes, little-endian)
pub const HEADER_SIZE: usize = 8;

/// Number of header bytes covered by the CRC (everything but the CRC itself)
pub const HEADER_CRC_SPAN: usize = 6;

/// Largest payload whose total frame length still fits the u16 length field
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - HEADER_SIZE;

/// Protocol version written into every outgoing header
pub const PROTOCOL_VERSION: u8 = 0;

/// ACK/NACK payloads start with the acknowledged sequence number (u16 LE)
pub const ACK_SEQUENCE_SIZE: usize = 2;

/// Offset of the progress percentage in an IGC data chunk
pub const CHUNK_PROGRESS_OFFSET: usize = 2;

/// Offset of the first IGC data byte in a data chunk
pub const CHUNK_DATA_OFFSET: usize = 3;

/// Shortest acceptable IGC data chunk payload
pub const MIN_CHUNK_SIZE: usize = 4;

/// Marks the final chunk of an IGC transfer when it is the last payload byte
pub const END_OF_DATA: u8 = 0x1A;

/// Timeout for control exchanges (select record, record info, ping)
pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timeout for a single IGC data chunk
pub const DATA_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default capacity of a `RecordedFlightList`
pub const DEFAULT_LIST_CAPACITY: usize = 128;

/// Longest field that can still be the date field of a record info string.
/// Firmware 5.x prepends the IGC file name, which is always longer.
pub const MAX_DATE_FIELD_LEN: usize = 10;
