use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in message pipe operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the pipe.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The peer endpoint has been closed.
    #[error("peer closed the pipe")]
    Closed,

    /// A buffer for the pending message could not be allocated.
    ///
    /// The offending message has already been discarded from the pipe.
    #[error("cannot allocate {requested} bytes for pending message")]
    NoMemory { requested: usize },

    /// The outbound message exceeds what the pipe can carry.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Zero-length messages cannot be told apart from end-of-stream.
    #[error("empty messages are not supported")]
    EmptyMessage,

    /// The readiness wait hit its deadline.
    #[error("timed out after {0:?} waiting for pipe readiness")]
    Timeout(Duration),

    /// This endpoint was already closed locally.
    #[error("pipe endpoint already closed")]
    HandleClosed,
}

impl TransportError {
    /// True when the error means the peer is gone.
    pub fn is_closed(&self) -> bool {
        match self {
            TransportError::Closed => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
