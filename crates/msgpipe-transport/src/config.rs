use std::time::Duration;

/// Default upper bound for a single inbound or outbound message: 64 KiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Configuration for a pipe endpoint.
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Largest message accepted in either direction. Default: 64 KiB.
    pub max_message_size: usize,
    /// Deadline for `wait_readable_or_closed`. `None` blocks forever.
    pub wait_deadline: Option<Duration>,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            wait_deadline: None,
        }
    }
}
