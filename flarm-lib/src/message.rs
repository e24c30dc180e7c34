use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;

/// Message types of the FLARM binary protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    #[strum(to_string = "ERROR")]
    Error = 0x00,
    #[strum(to_string = "PING")]
    Ping = 0x01,
    #[strum(to_string = "SETBAUDRATE")]
    SetBaudRate = 0x02,
    #[strum(to_string = "FLASHUPLOAD")]
    FlashUpload = 0x10,
    #[strum(to_string = "EXIT")]
    Exit = 0x12,
    #[strum(to_string = "SELECTRECORD")]
    SelectRecord = 0x20,
    #[strum(to_string = "GETRECORDINFO")]
    GetRecordInfo = 0x21,
    #[strum(to_string = "GETIGCDATA")]
    GetIgcData = 0x22,
    #[strum(to_string = "ACK")]
    Ack = 0xA0,
    #[strum(to_string = "NACK")]
    Nack = 0xB7,

    #[num_enum(catch_all)]
    #[strum(to_string = "UNKNOWN")]
    Unknown(u8),
}

impl MessageType {
    /// ACK and NACK are the only types a device sends in answer to a request.
    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, MessageType::Ack | MessageType::Nack)
    }
}
