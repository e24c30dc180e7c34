/// Progress reporting and cooperative cancellation for long device operations.
///
/// The driver polls [`OperationEnvironment::is_cancelled`] before each
/// request and right after each reply; it never interrupts I/O in flight.
pub trait OperationEnvironment: Send {
    fn set_progress_range(&mut self, _range: u32) {}

    fn set_progress_position(&mut self, _position: u32) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Environment that reports nothing and never cancels
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOperation;

impl OperationEnvironment for NullOperation {}
