use bytes::Bytes;

use crate::error::Result;

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// At least one complete message is pending.
    Readable,
    /// The peer closed its end and nothing is left to read.
    Closed,
}

/// A blocking, message-oriented duplex endpoint.
///
/// Every message is delivered whole: `read_message` never returns a partial
/// frame and `write_message` either transmits the complete frame or fails.
/// Messages are never empty; implementations refuse zero-length writes.
/// An endpoint is driven by a single worker; methods take `&mut self` to keep
/// it that way.
pub trait MessageChannel {
    /// Block until a message is pending or the peer has closed.
    ///
    /// Pending messages are reported before closure, so a peer that writes
    /// and then closes is fully drained first.
    fn wait_readable_or_closed(&mut self) -> Result<Readiness>;

    /// Read the next complete message.
    fn read_message(&mut self) -> Result<Bytes>;

    /// Write one complete, non-empty message.
    fn write_message(&mut self, frame: &[u8]) -> Result<()>;
}

impl<T: MessageChannel + ?Sized> MessageChannel for &mut T {
    fn wait_readable_or_closed(&mut self) -> Result<Readiness> {
        (**self).wait_readable_or_closed()
    }

    fn read_message(&mut self) -> Result<Bytes> {
        (**self).read_message()
    }

    fn write_message(&mut self, frame: &[u8]) -> Result<()> {
        (**self).write_message(frame)
    }
}

impl<T: MessageChannel + ?Sized> MessageChannel for Box<T> {
    fn wait_readable_or_closed(&mut self) -> Result<Readiness> {
        (**self).wait_readable_or_closed()
    }

    fn read_message(&mut self) -> Result<Bytes> {
        (**self).read_message()
    }

    fn write_message(&mut self, frame: &[u8]) -> Result<()> {
        (**self).write_message(frame)
    }
}
