//! Struct-header message codec for msgpipe frames.
//!
//! Every frame starts with a struct header (byte length + version), followed
//! by a message header (operation name + role flags), an optional 64-bit
//! correlation id, and a length-prefixed string payload.
//!
//! Fields are read at fixed offsets with explicit bounds checks; nothing is
//! ever reinterpreted in place.

pub mod codec;
pub mod error;
pub mod header;
pub mod payload;

pub use codec::{
    align, decode_message, encode_message, encode_message_padded, validate_echo_request,
    EchoRequest, Message, ALIGNMENT, MIN_ECHO_FRAME,
};
pub use error::{FrameError, HeaderDefect, Result};
pub use header::{
    decode_header, flags, DecodedHeader, MessageHeader, RequestMessageHeader, StructHeader,
    ECHO_NAME, MESSAGE_HEADER_SIZE, REQUEST_HEADER_SIZE, STRUCT_HEADER_SIZE, STRUCT_VERSION,
};
pub use payload::{StringPayload, ARRAY_HEADER_SIZE};
