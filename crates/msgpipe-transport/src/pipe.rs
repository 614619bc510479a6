use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::PipeConfig;
use crate::error::{Result, TransportError};
use crate::sys::{self, Inbound};
use crate::traits::{MessageChannel, Readiness};

/// One end of a message pipe.
///
/// Backed by an `AF_UNIX` / `SOCK_SEQPACKET` socket, so message boundaries
/// are preserved by the kernel and every read or write moves exactly one
/// whole message.
pub struct MessagePipe {
    fd: Option<OwnedFd>,
    config: PipeConfig,
}

impl MessagePipe {
    /// Create a connected pair of endpoints with default configuration.
    pub fn create() -> Result<(Self, Self)> {
        Self::create_with_config(PipeConfig::default())
    }

    /// Create a connected pair of endpoints sharing one configuration.
    pub fn create_with_config(config: PipeConfig) -> Result<(Self, Self)> {
        let (a, b) = sys::seqpacket_pair()?;
        debug!(
            a = a.as_raw_fd(),
            b = b.as_raw_fd(),
            "created message pipe pair"
        );
        Ok((
            Self::from_fd(a, config.clone()),
            Self::from_fd(b, config),
        ))
    }

    pub(crate) fn from_fd(fd: OwnedFd, config: PipeConfig) -> Self {
        Self {
            fd: Some(fd),
            config,
        }
    }

    /// Replace the endpoint configuration.
    pub fn with_config(mut self, config: PipeConfig) -> Self {
        self.config = config;
        self
    }

    /// Current endpoint configuration.
    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    /// Set the deadline used by `wait_readable_or_closed`.
    pub fn set_wait_deadline(&mut self, deadline: Option<Duration>) {
        self.config.wait_deadline = deadline;
    }

    /// Set the largest message accepted in either direction.
    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.config.max_message_size = max_message_size;
    }

    fn raw(&self) -> Result<RawFd> {
        self.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(TransportError::HandleClosed)
    }

    /// Block until a message is pending or the peer closed.
    ///
    /// Honors `PipeConfig::wait_deadline`; `None` waits forever.
    pub fn wait_readable_or_closed(&self) -> Result<Readiness> {
        let fd = self.raw()?;
        trace!(fd, "waiting for pipe to be readable (or closed)");
        let deadline = self
            .config
            .wait_deadline
            .map(|limit| (limit, Instant::now() + limit));
        loop {
            let remaining = deadline.map(|(_, at)| at.saturating_duration_since(Instant::now()));
            if sys::poll_readable(fd, remaining)?.is_none() {
                let limit = deadline.map(|(limit, _)| limit).unwrap_or_default();
                return Err(TransportError::Timeout(limit));
            }
            if let Some(readiness) = sys::probe(fd)? {
                trace!(fd, ?readiness, "pipe ready");
                return Ok(readiness);
            }
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Messages larger than `PipeConfig::max_message_size`, or ones whose
    /// buffer cannot be allocated, are dropped and reported as
    /// [`TransportError::NoMemory`].
    pub fn read_message(&self) -> Result<Bytes> {
        let fd = self.raw()?;
        inbound_to_result(sys::take_message(
            fd,
            self.config.max_message_size,
            false,
        )?)
    }

    /// Write one complete message (blocking).
    ///
    /// Empty frames are refused with [`TransportError::EmptyMessage`]: once the
    /// peer hangs up, a zero-length record reads the same as end-of-stream.
    pub fn write_message(&self, frame: &[u8]) -> Result<()> {
        let fd = self.raw()?;
        check_outbound_size(frame, self.config.max_message_size)?;
        match sys::send(fd, frame, false) {
            Ok(sent) => check_sent(sent, frame.len()),
            Err(err) => Err(send_error(err, frame.len(), self.config.max_message_size)),
        }
    }

    /// Release the endpoint. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            debug!(fd = fd.as_raw_fd(), "closing message pipe");
        }
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.fd.is_none()
    }

    #[cfg(feature = "async")]
    pub(crate) fn into_parts(mut self) -> Result<(OwnedFd, PipeConfig)> {
        let fd = self.fd.take().ok_or(TransportError::HandleClosed)?;
        Ok((fd, self.config.clone()))
    }
}

pub(crate) fn inbound_to_result(inbound: Inbound) -> Result<Bytes> {
    match inbound {
        Inbound::Message(bytes) => {
            trace!(size = bytes.len(), "read message");
            Ok(bytes)
        }
        Inbound::Oversized(requested) => {
            warn!(requested, "dropping message that cannot be buffered");
            Err(TransportError::NoMemory { requested })
        }
        Inbound::Closed => Err(TransportError::Closed),
    }
}

pub(crate) fn check_outbound_size(frame: &[u8], max: usize) -> Result<()> {
    if frame.is_empty() {
        return Err(TransportError::EmptyMessage);
    }
    if frame.len() > max {
        return Err(TransportError::MessageTooLarge {
            size: frame.len(),
            max,
        });
    }
    Ok(())
}

pub(crate) fn check_sent(sent: usize, expected: usize) -> Result<()> {
    if sent != expected {
        return Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            format!("short message write ({sent} of {expected} bytes)"),
        )));
    }
    trace!(size = sent, "wrote message");
    Ok(())
}

pub(crate) fn send_error(err: std::io::Error, size: usize, max: usize) -> TransportError {
    if sys::is_message_too_large(&err) {
        return TransportError::MessageTooLarge { size, max };
    }
    match err.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::NotConnected => TransportError::Closed,
        _ => TransportError::Io(err),
    }
}

impl MessageChannel for MessagePipe {
    fn wait_readable_or_closed(&mut self) -> Result<Readiness> {
        MessagePipe::wait_readable_or_closed(self)
    }

    fn read_message(&mut self) -> Result<Bytes> {
        MessagePipe::read_message(self)
    }

    fn write_message(&mut self, frame: &[u8]) -> Result<()> {
        MessagePipe::write_message(self, frame)
    }
}

impl std::fmt::Debug for MessagePipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePipe")
            .field("fd", &self.fd.as_ref().map(AsRawFd::as_raw_fd))
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_boundaries_are_preserved() {
        let (a, b) = MessagePipe::create().unwrap();
        a.write_message(b"first").unwrap();
        a.write_message(b"second").unwrap();

        assert_eq!(b.read_message().unwrap().as_ref(), b"first");
        assert_eq!(b.read_message().unwrap().as_ref(), b"second");
    }

    #[test]
    fn pipe_is_bidirectional() {
        let (a, b) = MessagePipe::create().unwrap();
        a.write_message(b"ping").unwrap();
        assert_eq!(b.read_message().unwrap().as_ref(), b"ping");
        b.write_message(b"pong").unwrap();
        assert_eq!(a.read_message().unwrap().as_ref(), b"pong");
    }

    #[test]
    fn wait_reports_readable_when_message_pending() {
        let (a, b) = MessagePipe::create().unwrap();
        a.write_message(b"x").unwrap();
        assert_eq!(b.wait_readable_or_closed().unwrap(), Readiness::Readable);
    }

    #[test]
    fn wait_reports_closed_after_peer_close() {
        let (mut a, b) = MessagePipe::create().unwrap();
        a.close();
        assert_eq!(b.wait_readable_or_closed().unwrap(), Readiness::Closed);
    }

    #[test]
    fn pending_messages_drain_before_closed() {
        let (mut a, b) = MessagePipe::create().unwrap();
        a.write_message(b"last words").unwrap();
        a.close();

        assert_eq!(b.wait_readable_or_closed().unwrap(), Readiness::Readable);
        assert_eq!(b.read_message().unwrap().as_ref(), b"last words");
        assert_eq!(b.wait_readable_or_closed().unwrap(), Readiness::Closed);
    }

    #[test]
    fn wait_unblocks_when_peer_closes_from_another_thread() {
        let (a, b) = MessagePipe::create().unwrap();
        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            drop(a);
        });
        assert_eq!(b.wait_readable_or_closed().unwrap(), Readiness::Closed);
        closer.join().unwrap();
    }

    #[test]
    fn wait_deadline_expires() {
        let (_a, mut b) = MessagePipe::create().unwrap();
        b.set_wait_deadline(Some(Duration::from_millis(10)));
        let err = b.wait_readable_or_closed().unwrap_err();
        assert!(matches!(err, TransportError::Timeout(d) if d == Duration::from_millis(10)));
    }

    #[test]
    fn read_after_peer_close_reports_closed() {
        let (a, b) = MessagePipe::create().unwrap();
        drop(a);
        assert!(matches!(b.read_message(), Err(TransportError::Closed)));
    }

    #[test]
    fn write_after_peer_close_reports_closed() {
        let (a, b) = MessagePipe::create().unwrap();
        drop(b);
        assert!(matches!(
            a.write_message(b"nobody home"),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn oversized_message_is_dropped_and_pipe_stays_usable() {
        let (a, mut b) = MessagePipe::create().unwrap();
        b.set_max_message_size(8);

        a.write_message(&[0xAB; 32]).unwrap();
        a.write_message(b"small").unwrap();

        let err = b.read_message().unwrap_err();
        assert!(matches!(err, TransportError::NoMemory { requested: 32 }));
        assert_eq!(b.read_message().unwrap().as_ref(), b"small");
    }

    #[test]
    fn outbound_size_limit_is_enforced() {
        let (mut a, _b) = MessagePipe::create().unwrap();
        a.set_max_message_size(4);
        let err = a.write_message(b"too long").unwrap_err();
        assert!(matches!(
            err,
            TransportError::MessageTooLarge { size: 8, max: 4 }
        ));
    }

    #[test]
    fn empty_message_is_refused() {
        let (mut a, b) = MessagePipe::create().unwrap();
        assert!(matches!(
            a.write_message(b""),
            Err(TransportError::EmptyMessage)
        ));

        a.write_message(b"after").unwrap();
        a.close();

        assert_eq!(b.wait_readable_or_closed().unwrap(), Readiness::Readable);
        assert_eq!(b.read_message().unwrap().as_ref(), b"after");
        assert_eq!(b.wait_readable_or_closed().unwrap(), Readiness::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut a, _b) = MessagePipe::create().unwrap();
        a.close();
        a.close();
        assert!(a.is_closed());
        assert!(matches!(
            a.read_message(),
            Err(TransportError::HandleClosed)
        ));
        assert!(matches!(
            a.wait_readable_or_closed(),
            Err(TransportError::HandleClosed)
        ));
    }

    #[test]
    fn usable_through_trait_object() {
        let (a, b) = MessagePipe::create().unwrap();
        let mut channel: Box<dyn MessageChannel> = Box::new(b);
        a.write_message(b"dyn").unwrap();
        assert_eq!(
            channel.wait_readable_or_closed().unwrap(),
            Readiness::Readable
        );
        assert_eq!(channel.read_message().unwrap().as_ref(), b"dyn");
    }
}
