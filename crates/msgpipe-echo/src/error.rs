use msgpipe_frame::FrameError;
use msgpipe_transport::TransportError;

/// Errors that can occur while serving or issuing echo requests.
#[derive(Debug, thiserror::Error)]
pub enum EchoError {
    /// Waiting on or reading from the pipe failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Writing a frame failed; the exchange is abandoned.
    #[error("write failed: {0}")]
    WriteFailure(TransportError),

    /// A frame could not be decoded or encoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A reply carried a different correlation id than the request.
    #[error("reply correlation mismatch (expected request {expected}, got {actual})")]
    CorrelationMismatch { expected: u64, actual: u64 },

    /// The peer answered with something other than an echo reply.
    #[error("unexpected reply (name {name}, flags {flags:#x})")]
    UnexpectedReply { name: u32, flags: u32 },
}

impl EchoError {
    /// True when the peer is gone.
    pub fn is_closed(&self) -> bool {
        match self {
            EchoError::Transport(err) | EchoError::WriteFailure(err) => err.is_closed(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EchoError>;
