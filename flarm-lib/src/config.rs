use crate::constants::{CONTROL_TIMEOUT, DATA_TIMEOUT, DEFAULT_LIST_CAPACITY};
use std::time::Duration;

/// Per-connection settings for a [`FlarmDevice`](crate::device::FlarmDevice)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlarmConfig {
    /// Deadline for select/record-info/ping exchanges
    pub control_timeout: Duration,
    /// Deadline for each IGC data chunk
    pub data_timeout: Duration,
    /// Capacity of lists created by `FlarmDevice::new_flight_list`
    pub list_capacity: usize,
}

impl Default for FlarmConfig {
    fn default() -> Self {
        Self {
            control_timeout: CONTROL_TIMEOUT,
            data_timeout: DATA_TIMEOUT,
            list_capacity: DEFAULT_LIST_CAPACITY,
        }
    }
}

impl FlarmConfig {
    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    pub fn with_data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    pub fn with_list_capacity(mut self, capacity: usize) -> Self {
        self.list_capacity = capacity;
        self
    }
}
