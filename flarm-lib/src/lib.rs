pub mod codec;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod header;
pub mod message;
pub mod operation;
pub mod record;


// Re-export the FlarmDevice struct for easy access
pub use config::FlarmConfig;
pub use device::FlarmDevice;
pub use error::FlarmError;
pub use message::MessageType;
pub use operation::{NullOperation, OperationEnvironment};
pub use record::{BrokenDate, BrokenTime, RecordedFlightInfo, RecordedFlightList};
