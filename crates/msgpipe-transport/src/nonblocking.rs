use std::os::fd::{AsRawFd, OwnedFd};

use bytes::Bytes;
use tokio::io::unix::AsyncFd;

use crate::config::PipeConfig;
use crate::error::{Result, TransportError};
use crate::pipe::{check_outbound_size, check_sent, inbound_to_result, send_error, MessagePipe};
use crate::sys;
use crate::traits::Readiness;

/// Tokio-driven variant of [`MessagePipe`].
///
/// Readiness comes from the runtime reactor instead of `poll(2)`; message
/// semantics are identical.
pub struct AsyncMessagePipe {
    inner: AsyncFd<OwnedFd>,
    config: PipeConfig,
}

impl AsyncMessagePipe {
    /// Register a blocking endpoint with the current tokio runtime.
    pub fn from_pipe(pipe: MessagePipe) -> Result<Self> {
        let (fd, config) = pipe.into_parts()?;
        sys::set_nonblocking(fd.as_raw_fd())?;
        Ok(Self {
            inner: AsyncFd::new(fd)?,
            config,
        })
    }

    /// Create a connected pair registered with the current runtime.
    pub fn create() -> Result<(Self, Self)> {
        let (a, b) = MessagePipe::create()?;
        Ok((Self::from_pipe(a)?, Self::from_pipe(b)?))
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

    /// Wait until a message is pending or the peer closed.
    pub async fn wait_readable_or_closed(&self) -> Result<Readiness> {
        match self.config.wait_deadline {
            Some(limit) => tokio::time::timeout(limit, self.wait_ready())
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => self.wait_ready().await,
        }
    }

    async fn wait_ready(&self) -> Result<Readiness> {
        loop {
            let mut guard = self.inner.readable().await?;
            match sys::probe(self.inner.get_ref().as_raw_fd())? {
                Some(readiness) => return Ok(readiness),
                None => guard.clear_ready(),
            }
        }
    }

    /// Read the next complete message.
    pub async fn read_message(&self) -> Result<Bytes> {
        loop {
            let mut guard = self.inner.readable().await?;
            let max = self.config.max_message_size;
            match guard.try_io(|fd| sys::take_message(fd.get_ref().as_raw_fd(), max, true)) {
                Ok(inbound) => return inbound_to_result(inbound?),
                Err(_would_block) => continue,
            }
        }
    }

    /// Write one complete message.
    pub async fn write_message(&self, frame: &[u8]) -> Result<()> {
        check_outbound_size(frame, self.config.max_message_size)?;
        loop {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|fd| sys::send(fd.get_ref().as_raw_fd(), frame, true)) {
                Ok(Ok(sent)) => return check_sent(sent, frame.len()),
                Ok(Err(err)) => {
                    return Err(send_error(err, frame.len(), self.config.max_message_size))
                }
                Err(_would_block) => continue,
            }
        }
    }
}

impl std::fmt::Debug for AsyncMessagePipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMessagePipe")
            .field("fd", &self.inner.get_ref().as_raw_fd())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn async_roundtrip() {
        let (a, b) = AsyncMessagePipe::create().unwrap();
        a.write_message(b"async").await.unwrap();

        assert_eq!(b.wait_readable_or_closed().await.unwrap(), Readiness::Readable);
        assert_eq!(b.read_message().await.unwrap().as_ref(), b"async");
    }

    #[tokio::test]
    async fn async_refuses_empty_message() {
        let (a, _b) = AsyncMessagePipe::create().unwrap();
        assert!(matches!(
            a.write_message(b"").await,
            Err(TransportError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn async_reports_closed() {
        let (a, b) = AsyncMessagePipe::create().unwrap();
        drop(a);
        assert_eq!(b.wait_readable_or_closed().await.unwrap(), Readiness::Closed);
        assert!(matches!(
            b.read_message().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn async_wait_deadline_expires() {
        let (a, _b) = MessagePipe::create().unwrap();
        let mut a = a;
        a.set_wait_deadline(Some(Duration::from_millis(10)));
        let a = AsyncMessagePipe::from_pipe(a).unwrap();
        assert!(matches!(
            a.wait_readable_or_closed().await,
            Err(TransportError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn mixes_with_blocking_peer() {
        let (blocking, other) = MessagePipe::create().unwrap();
        let other = AsyncMessagePipe::from_pipe(other).unwrap();

        let writer = std::thread::spawn(move || {
            blocking.write_message(b"from thread").unwrap();
            blocking
        });

        assert_eq!(other.read_message().await.unwrap().as_ref(), b"from thread");
        let _blocking = writer.join().unwrap();
    }
}
