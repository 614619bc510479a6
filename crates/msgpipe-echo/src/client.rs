use bytes::{Bytes, BytesMut};
use msgpipe_frame::{decode_message, encode_message, Message, StringPayload, ECHO_NAME};
use msgpipe_transport::{MessageChannel, Readiness, TransportError};
use tracing::debug;

use crate::error::{EchoError, Result};

/// Issues echo requests over a channel and checks the replies.
///
/// One request is outstanding at a time, so replies pair with requests by
/// order as well as by correlation id.
pub struct EchoClient<C> {
    channel: C,
    next_id: u64,
    buf: BytesMut,
}

impl<C: MessageChannel> EchoClient<C> {
    pub fn new(channel: C) -> Self {
        Self::starting_at(channel, 1)
    }

    /// Start issuing request ids at `first_id`.
    pub fn starting_at(channel: C, first_id: u64) -> Self {
        Self {
            channel,
            next_id: first_id,
            buf: BytesMut::new(),
        }
    }

    /// Allocate the next request id. Ids increase by one and wrap at `u64::MAX`.
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Encode and write one request without waiting for the reply.
    pub fn send_request(&mut self, request_id: u64, payload: StringPayload) -> Result<()> {
        let request = Message::request(request_id, payload);
        self.buf.clear();
        encode_message(&request, &mut self.buf)?;
        debug!(request_id, size = self.buf.len(), "sending echo request");
        self.channel
            .write_message(&self.buf)
            .map_err(EchoError::WriteFailure)
    }

    /// Wait for and decode the next reply.
    ///
    /// Fails with `Transport(Closed)` if the peer hangs up first.
    pub fn recv_reply(&mut self) -> Result<Message> {
        if self.channel.wait_readable_or_closed()? == Readiness::Closed {
            return Err(TransportError::Closed.into());
        }
        let frame = self.channel.read_message()?;
        let reply = decode_message(&frame)?;
        if reply.header.name != ECHO_NAME || !reply.is_response() {
            return Err(EchoError::UnexpectedReply {
                name: reply.header.name,
                flags: reply.header.flags,
            });
        }
        Ok(reply)
    }

    /// Send a request with `request_id` and wait for its reply.
    pub fn call(&mut self, request_id: u64, payload: StringPayload) -> Result<Message> {
        self.send_request(request_id, payload)?;
        let reply = self.recv_reply()?;
        let actual = reply.request_id.unwrap_or_default();
        if actual != request_id {
            return Err(EchoError::CorrelationMismatch {
                expected: request_id,
                actual,
            });
        }
        debug!(request_id, size = reply.payload.bytes.len(), "got echo reply");
        Ok(reply)
    }

    /// Echo `data` under a fresh request id and return the echoed bytes.
    pub fn echo(&mut self, data: impl Into<Bytes>) -> Result<Bytes> {
        let request_id = self.next_request_id();
        let reply = self.call(request_id, StringPayload::new(data))?;
        Ok(reply.payload.bytes)
    }

    pub fn get_ref(&self) -> &C {
        &self.channel
    }

    pub fn into_inner(self) -> C {
        self.channel
    }
}
