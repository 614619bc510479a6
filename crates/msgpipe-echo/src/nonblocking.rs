use bytes::BytesMut;
use msgpipe_transport::{AsyncMessagePipe, Readiness, TransportError};
use tracing::{debug, info, trace, warn};

use crate::config::ResponderConfig;
use crate::error::{EchoError, Result};
use crate::responder::{build_reply, log_request, Exchange, ExchangeState, ServeSummary};

/// Echo responder driven by the tokio reactor.
///
/// Exchange semantics match [`crate::EchoResponder`]; only the waits differ.
pub struct AsyncEchoResponder {
    pipe: AsyncMessagePipe,
    buf: BytesMut,
    state: ExchangeState,
    config: ResponderConfig,
}

impl AsyncEchoResponder {
    pub fn new(pipe: AsyncMessagePipe) -> Self {
        Self::with_config(pipe, ResponderConfig::default())
    }

    /// Create a responder and apply `config.pipe` to the endpoint.
    pub fn with_config(pipe: AsyncMessagePipe, config: ResponderConfig) -> Self {
        Self {
            pipe: pipe.with_config(config.pipe.clone()),
            buf: BytesMut::new(),
            state: ExchangeState::AwaitingFrame,
            config,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn transition(&mut self, next: ExchangeState) {
        trace!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
    }

    pub async fn serve_one(&mut self) -> Result<Exchange> {
        self.transition(ExchangeState::AwaitingFrame);
        if self.pipe.wait_readable_or_closed().await? == Readiness::Closed {
            return Ok(Exchange::Closed);
        }

        let frame = match self.pipe.read_message().await {
            Ok(frame) => frame,
            Err(TransportError::Closed) => return Ok(Exchange::Closed),
            Err(TransportError::NoMemory { requested }) => {
                self.transition(ExchangeState::Rejected);
                warn!(requested, "dropped request that could not be buffered");
                return Ok(Exchange::Dropped { requested });
            }
            Err(err) => return Err(err.into()),
        };

        self.transition(ExchangeState::Validating);
        let request = match build_reply(&frame, &mut self.buf) {
            Ok(request) => request,
            Err(err) => {
                self.transition(ExchangeState::Rejected);
                warn!(size = frame.len(), error = %err, "rejected frame");
                return Ok(Exchange::Rejected(err));
            }
        };
        log_request(&request);

        self.transition(ExchangeState::Echoing);
        self.pipe
            .write_message(&self.buf)
            .await
            .map_err(EchoError::WriteFailure)?;

        self.transition(ExchangeState::Done);
        Ok(Exchange::Served {
            request_id: request.request_id(),
            payload_len: request.payload.bytes.len(),
        })
    }

    pub async fn serve(&mut self) -> Result<ServeSummary> {
        let mut summary = ServeSummary::default();
        while self
            .config
            .max_exchanges
            .is_none_or(|limit| summary.served < limit)
        {
            let exchange = self.serve_one().await?;
            if exchange == Exchange::Closed {
                debug!("peer closed; no more requests");
                break;
            }
            summary.record(&exchange);
        }
        info!(
            served = summary.served,
            rejected = summary.rejected,
            dropped = summary.dropped,
            "async echo responder finished"
        );
        Ok(summary)
    }

    pub fn into_inner(self) -> AsyncMessagePipe {
        self.pipe
    }
}
