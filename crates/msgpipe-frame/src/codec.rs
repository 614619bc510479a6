use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, HeaderDefect, Result};
use crate::header::{
    decode_header, flags, MessageHeader, RequestMessageHeader, StructHeader, ECHO_NAME,
    REQUEST_HEADER_SIZE, STRUCT_VERSION,
};
use crate::payload::{StringPayload, ARRAY_HEADER_SIZE};

/// Encoded frames are padded to this boundary.
pub const ALIGNMENT: usize = 8;

/// Smallest frame that can carry an echo request: header + empty payload.
pub const MIN_ECHO_FRAME: usize = REQUEST_HEADER_SIZE + ARRAY_HEADER_SIZE;

/// Round `len` up to the next multiple of [`ALIGNMENT`].
pub fn align(len: usize) -> usize {
    len.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// A decoded message: header, optional correlation id, and string payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    /// Present iff a role flag is set.
    pub request_id: Option<u64>,
    pub payload: StringPayload,
}

impl Message {
    /// Build an echo request. `num_bytes` is set to the padded frame length.
    pub fn request(request_id: u64, payload: StringPayload) -> Self {
        let len = align(REQUEST_HEADER_SIZE + payload.wire_size());
        Self {
            header: MessageHeader {
                struct_header: StructHeader {
                    num_bytes: len.min(u32::MAX as usize) as u32,
                    version: STRUCT_VERSION,
                },
                name: ECHO_NAME,
                flags: flags::EXPECTS_RESPONSE,
            },
            request_id: Some(request_id),
            payload,
        }
    }

    /// Turn a request into its reply.
    ///
    /// The struct header, request id and payload are kept; only the role flips.
    pub fn into_reply(mut self) -> Self {
        self.header.name = ECHO_NAME;
        self.header.flags = flags::IS_RESPONSE;
        self.request_id = Some(self.request_id.unwrap_or_default());
        self
    }

    pub fn is_request(&self) -> bool {
        self.header.expects_response()
    }

    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    /// The request header, when this message carries a correlation id.
    pub fn request_header(&self) -> Option<RequestMessageHeader> {
        self.request_id.map(|request_id| RequestMessageHeader {
            message_header: self.header,
            request_id,
        })
    }

    /// Encoded length before alignment padding.
    pub fn unpadded_len(&self) -> usize {
        self.header.wire_size() + self.payload.wire_size()
    }

    /// Encoded length with alignment padding.
    pub fn wire_size(&self) -> usize {
        align(self.unpadded_len())
    }
}

/// Decode a frame into a [`Message`].
///
/// Applies every structural check (version, struct size, payload bounds) but
/// no operation or role policy beyond rejecting a message that claims both
/// roles at once.
pub fn decode_message(frame: &Bytes) -> Result<Message> {
    let decoded = decode_header(frame)?;
    let both = flags::EXPECTS_RESPONSE | flags::IS_RESPONSE;
    if decoded.header.flags & both == both {
        return Err(HeaderDefect::ConflictingRoles(decoded.header.flags).into());
    }
    let payload = StringPayload::decode(frame, decoded.body_offset)?;
    Ok(Message {
        header: decoded.header,
        request_id: decoded.request_id,
        payload,
    })
}

/// Encode a message, zero-padded to [`ALIGNMENT`].
pub fn encode_message(message: &Message, dst: &mut BytesMut) -> Result<()> {
    encode_message_padded(message, message.wire_size(), dst)
}

/// Encode a message into exactly `total_len` bytes, zero-filling the tail.
///
/// The struct header is written as stored in `message`.
pub fn encode_message_padded(
    message: &Message,
    total_len: usize,
    dst: &mut BytesMut,
) -> Result<()> {
    if total_len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: total_len,
            max: u32::MAX as usize,
        });
    }
    let needed = message.unpadded_len();
    if total_len < needed {
        return Err(FrameError::PaddingTooSmall {
            needed,
            requested: total_len,
        });
    }

    dst.reserve(total_len);
    message.header.encode(dst);
    if flags::has_request_id(message.header.flags) {
        dst.put_u64_ne(message.request_id.unwrap_or_default());
    }
    message.payload.encode(dst);
    dst.put_bytes(0, total_len - needed);
    Ok(())
}

/// A frame that passed echo validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub header: RequestMessageHeader,
    pub payload: StringPayload,
    /// Length of the inbound frame; the reply is the same size.
    pub frame_len: usize,
}

impl EchoRequest {
    pub fn request_id(&self) -> u64 {
        self.header.request_id
    }

    /// The reply message: same struct header, request id and payload.
    pub fn reply(&self) -> Message {
        Message {
            header: self.header.message_header,
            request_id: Some(self.header.request_id),
            payload: self.payload.clone(),
        }
        .into_reply()
    }

    /// Encode the reply at the inbound frame's length.
    pub fn encode_reply(&self, dst: &mut BytesMut) -> Result<()> {
        encode_message_padded(&self.reply(), self.frame_len, dst)
    }
}

/// Validate an inbound frame as an echo request.
///
/// Checks run in order: header structure and version, operation name, role
/// flags (must be exactly `EXPECTS_RESPONSE`), then payload bounds.
pub fn validate_echo_request(frame: &Bytes) -> Result<EchoRequest> {
    let decoded = decode_header(frame)?;
    let header = decoded.header;

    if header.name != ECHO_NAME {
        return Err(FrameError::UnknownOperation(header.name));
    }
    if header.flags != flags::EXPECTS_RESPONSE {
        return Err(FrameError::UnexpectedFlags {
            flags: header.flags,
            expected: flags::EXPECTS_RESPONSE,
        });
    }
    if frame.len() < MIN_ECHO_FRAME {
        return Err(FrameError::MissingPayload {
            needed: MIN_ECHO_FRAME,
            frame_len: frame.len(),
        });
    }

    let payload = StringPayload::decode(frame, decoded.body_offset)?;

    Ok(EchoRequest {
        header: RequestMessageHeader {
            message_header: header,
            request_id: decoded.request_id.unwrap_or_default(),
        },
        payload,
        frame_len: frame.len(),
    })
}
