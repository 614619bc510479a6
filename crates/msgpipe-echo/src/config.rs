use msgpipe_transport::PipeConfig;

/// Configuration for an echo responder.
#[derive(Debug, Clone, Default)]
pub struct ResponderConfig {
    /// Applied to the pipe when the responder owns a [`msgpipe_transport::MessagePipe`].
    pub pipe: PipeConfig,
    /// Stop `serve` after this many replies. `None` serves until the peer closes.
    pub max_exchanges: Option<u64>,
}
