use bytes::{Bytes, BytesMut};
use msgpipe_frame::{validate_echo_request, EchoRequest, FrameError};
use msgpipe_transport::{MessageChannel, Readiness, TransportError};
use tracing::{debug, info, trace, warn};

use crate::config::ResponderConfig;
use crate::error::{EchoError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Where the current exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    AwaitingFrame,
    Validating,
    Echoing,
    Done,
    Rejected,
}

/// Outcome of one exchange that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// A reply was written.
    Served { request_id: u64, payload_len: usize },
    /// The frame failed validation; no reply was sent.
    Rejected(FrameError),
    /// The frame could not be buffered and was discarded.
    Dropped { requested: usize },
    /// The peer closed the pipe.
    Closed,
}

/// Tally returned when a serve loop ends cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub served: u64,
    pub rejected: u64,
    pub dropped: u64,
}

impl ServeSummary {
    /// Count one exchange. `Closed` is not counted.
    pub fn record(&mut self, exchange: &Exchange) {
        match exchange {
            Exchange::Served { .. } => self.served += 1,
            Exchange::Rejected(_) => self.rejected += 1,
            Exchange::Dropped { .. } => self.dropped += 1,
            Exchange::Closed => {}
        }
    }
}

/// Validate `frame` as an echo request and encode its reply into `dst`.
///
/// `dst` is cleared first. The reply has the inbound frame's length.
pub fn build_reply(frame: &Bytes, dst: &mut BytesMut) -> std::result::Result<EchoRequest, FrameError> {
    let request = validate_echo_request(frame)?;
    dst.clear();
    request.encode_reply(dst)?;
    Ok(request)
}

pub(crate) fn log_request(request: &EchoRequest) {
    let payload = &request.payload;
    debug!(
        request_id = request.request_id(),
        num_bytes = payload.num_bytes(),
        num_elems = payload.num_elems,
        text = payload.as_str().unwrap_or("<binary>"),
        "got echo request"
    );
}

/// Serves echo requests on one channel, one exchange at a time.
///
/// Each exchange walks `AwaitingFrame → Validating → Echoing → Done`, or ends
/// in `Rejected` when the frame is malformed. Replies leave in request order.
pub struct EchoResponder<C> {
    channel: C,
    buf: BytesMut,
    state: ExchangeState,
    config: ResponderConfig,
}

impl<C: MessageChannel> EchoResponder<C> {
    /// Create a responder with default configuration.
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, ResponderConfig::default())
    }

    /// Create a responder with explicit configuration.
    ///
    /// `config.pipe` is not applied to `channel`; see [`EchoResponder::for_pipe`].
    pub fn with_config(channel: C, config: ResponderConfig) -> Self {
        Self {
            channel,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: ExchangeState::AwaitingFrame,
            config,
        }
    }

    /// State of the most recent exchange.
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn transition(&mut self, next: ExchangeState) {
        trace!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
    }

    /// Run a single exchange.
    ///
    /// Validation failures and dropped frames come back as values; only
    /// transport failures are errors. A failed reply write surfaces as
    /// [`EchoError::WriteFailure`] and is not retried.
    pub fn serve_one(&mut self) -> Result<Exchange> {
        self.transition(ExchangeState::AwaitingFrame);
        if self.channel.wait_readable_or_closed()? == Readiness::Closed {
            debug!("peer closed; no more requests");
            return Ok(Exchange::Closed);
        }

        let frame = match self.channel.read_message() {
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
        self.channel
            .write_message(&self.buf)
            .map_err(EchoError::WriteFailure)?;

        self.transition(ExchangeState::Done);
        debug!(request_id = request.request_id(), "served request");
        Ok(Exchange::Served {
            request_id: request.request_id(),
            payload_len: request.payload.bytes.len(),
        })
    }

    /// Serve exchanges until the peer closes (or `max_exchanges` replies).
    pub fn serve(&mut self) -> Result<ServeSummary> {
        let mut summary = ServeSummary::default();
        loop {
            if let Some(limit) = self.config.max_exchanges {
                if summary.served >= limit {
                    break;
                }
            }
            let exchange = self.serve_one()?;
            if exchange == Exchange::Closed {
                break;
            }
            summary.record(&exchange);
        }
        info!(
            served = summary.served,
            rejected = summary.rejected,
            dropped = summary.dropped,
            "echo responder finished"
        );
        Ok(summary)
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> &C {
        &self.channel
    }

    /// Mutably borrow the underlying channel.
    pub fn get_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Consume the responder and return the channel.
    pub fn into_inner(self) -> C {
        self.channel
    }
}

#[cfg(target_os = "linux")]
impl EchoResponder<msgpipe_transport::MessagePipe> {
    /// Take ownership of a pipe endpoint and apply `config.pipe` to it.
    pub fn for_pipe(pipe: msgpipe_transport::MessagePipe, config: ResponderConfig) -> Self {
        let pipe = pipe.with_config(config.pipe.clone());
        Self::with_config(pipe, config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use msgpipe_frame::{
        decode_message, encode_message, flags, HeaderDefect, Message, StringPayload,
    };

    use super::*;

    /// Scripted channel: replays inbound events and records writes.
    #[derive(Default)]
    struct ScriptedChannel {
        inbound: VecDeque<std::result::Result<Bytes, TransportError>>,
        written: Vec<Bytes>,
        fail_writes: bool,
    }

    impl ScriptedChannel {
        fn push(&mut self, frame: impl Into<Bytes>) {
            self.inbound.push_back(Ok(frame.into()));
        }
    }

    impl MessageChannel for ScriptedChannel {
        fn wait_readable_or_closed(&mut self) -> msgpipe_transport::Result<Readiness> {
            if self.inbound.is_empty() {
                Ok(Readiness::Closed)
            } else {
                Ok(Readiness::Readable)
            }
        }

        fn read_message(&mut self) -> msgpipe_transport::Result<Bytes> {
            self.inbound.pop_front().unwrap_or(Err(TransportError::Closed))
        }

        fn write_message(&mut self, frame: &[u8]) -> msgpipe_transport::Result<()> {
            if self.fail_writes {
                return Err(TransportError::Closed);
            }
            self.written.push(Bytes::copy_from_slice(frame));
            Ok(())
        }
    }

    fn request_frame(request_id: u64, text: &[u8]) -> Bytes {
        let mut buf = BytesMut::new();
        encode_message(
            &Message::request(request_id, StringPayload::new(Bytes::copy_from_slice(text))),
            &mut buf,
        )
        .unwrap();
        buf.freeze()
    }

    fn words(words: &[u32]) -> Bytes {
        Bytes::from(
            words
                .iter()
                .flat_map(|w| w.to_ne_bytes())
                .collect::<Vec<u8>>(),
        )
    }

    #[test]
    fn serves_valid_request() {
        let mut channel = ScriptedChannel::default();
        channel.push(request_frame(42, b"hello"));

        let mut responder = EchoResponder::new(&mut channel);
        let exchange = responder.serve_one().unwrap();
        assert_eq!(
            exchange,
            Exchange::Served {
                request_id: 42,
                payload_len: 5
            }
        );
        assert_eq!(responder.state(), ExchangeState::Done);

        let reply = decode_message(&channel.written[0]).unwrap();
        assert_eq!(reply.header.flags, flags::IS_RESPONSE);
        assert_eq!(reply.request_id, Some(42));
        assert_eq!(reply.payload.bytes.as_ref(), b"hello");
    }

    #[test]
    fn reply_has_inbound_length() {
        let mut channel = ScriptedChannel::default();
        let frame = words(&[24, 1, 0, 1, 0, 0, 4, 4, 0x4242_4143]);
        channel.push(frame.clone());

        EchoResponder::new(&mut channel).serve_one().unwrap();
        assert_eq!(channel.written[0].len(), frame.len());
    }

    #[test]
    fn rejected_frame_sends_nothing() {
        let mut channel = ScriptedChannel::default();
        channel.push(words(&[24, 9, 0, 1, 0, 0, 0, 0]));

        let mut responder = EchoResponder::new(&mut channel);
        let exchange = responder.serve_one().unwrap();
        assert_eq!(
            exchange,
            Exchange::Rejected(FrameError::InvalidHeader(
                HeaderDefect::UnsupportedVersion(9)
            ))
        );
        assert_eq!(responder.state(), ExchangeState::Rejected);
        assert!(channel.written.is_empty());
    }

    #[test]
    fn rejection_does_not_stop_the_loop() {
        let mut channel = ScriptedChannel::default();
        channel.push(request_frame(1, b"a"));
        channel.push(words(&[24, 1, 0, flags::IS_RESPONSE, 0, 0, 0, 0]));
        channel.push(request_frame(2, b"b"));

        let summary = EchoResponder::new(&mut channel).serve().unwrap();
        assert_eq!(
            summary,
            ServeSummary {
                served: 2,
                rejected: 1,
                dropped: 0
            }
        );

        let ids: Vec<_> = channel
            .written
            .iter()
            .map(|frame| decode_message(frame).unwrap().request_id)
            .collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
    }

    #[test]
    fn dropped_frame_is_counted() {
        let mut channel = ScriptedChannel::default();
        channel
            .inbound
            .push_back(Err(TransportError::NoMemory { requested: 1 << 30 }));
        channel.push(request_frame(3, b"after"));

        let summary = EchoResponder::new(&mut channel).serve().unwrap();
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.served, 1);
    }

    #[test]
    fn closed_channel_ends_cleanly() {
        let mut channel = ScriptedChannel::default();
        let mut responder = EchoResponder::new(&mut channel);
        assert_eq!(responder.serve_one().unwrap(), Exchange::Closed);
        assert_eq!(responder.serve().unwrap(), ServeSummary::default());
    }

    #[test]
    fn write_failure_is_reported() {
        let mut channel = ScriptedChannel {
            fail_writes: true,
            ..ScriptedChannel::default()
        };
        channel.push(request_frame(5, b"x"));

        let mut responder = EchoResponder::new(&mut channel);
        let err = responder.serve().unwrap_err();
        assert!(matches!(err, EchoError::WriteFailure(TransportError::Closed)));
        assert_eq!(responder.state(), ExchangeState::Echoing);
    }

    #[test]
    fn max_exchanges_limits_serve() {
        let mut channel = ScriptedChannel::default();
        channel.push(request_frame(1, b"one"));
        channel.push(request_frame(2, b"two"));

        let config = ResponderConfig {
            max_exchanges: Some(1),
            ..ResponderConfig::default()
        };
        let summary = EchoResponder::with_config(&mut channel, config)
            .serve()
            .unwrap();
        assert_eq!(summary.served, 1);
        assert_eq!(channel.inbound.len(), 1);
    }

    #[test]
    fn build_reply_flips_only_the_role() {
        let frame = request_frame(77, b"payload");
        let mut out = BytesMut::new();
        build_reply(&frame, &mut out).unwrap();

        assert_eq!(out.len(), frame.len());
        assert_eq!(&out[..12], &frame[..12]);
        assert_eq!(&out[12..16], &flags::IS_RESPONSE.to_ne_bytes());
        assert_eq!(&out[16..], &frame[16..]);
    }
}
