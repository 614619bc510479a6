//! Struct and message headers.
//!
//! ```text
//! ┌────────────┬────────────┬────────────┬────────────┬──────────────────┐
//! │ num_bytes  │ version    │ name       │ flags      │ request_id       │
//! │ u32 @0     │ u32 @4     │ u32 @8     │ u32 @12    │ u64 @16 (opt.)   │
//! └────────────┴────────────┴────────────┴────────────┴──────────────────┘
//! ```
//!
//! All integers are native-endian; both ends of a pipe share one host.
//! `request_id` is present only when a role flag is set.

use bytes::{BufMut, BytesMut};

use crate::error::{HeaderDefect, Result};

/// Struct header: num_bytes (4) + version (4).
pub const STRUCT_HEADER_SIZE: usize = 8;

/// Message header without a request id.
pub const MESSAGE_HEADER_SIZE: usize = STRUCT_HEADER_SIZE + 8;

/// Message header carrying a request id.
pub const REQUEST_HEADER_SIZE: usize = MESSAGE_HEADER_SIZE + 8;

/// The only struct version this codec accepts.
pub const STRUCT_VERSION: u32 = 1;

/// Operation name of the echo exchange.
pub const ECHO_NAME: u32 = 0;

/// Message role flags.
pub mod flags {
    /// The sender is waiting for a reply.
    pub const EXPECTS_RESPONSE: u32 = 1 << 0;
    /// This message is a reply.
    pub const IS_RESPONSE: u32 = 1 << 1;
    /// Either role bit.
    pub const ROLE_MASK: u32 = EXPECTS_RESPONSE | IS_RESPONSE;

    #[inline]
    pub fn has_flag(flags: u32, flag: u32) -> bool {
        flags & flag != 0
    }

    /// True when the header carries a request id.
    #[inline]
    pub fn has_request_id(flags: u32) -> bool {
        flags & ROLE_MASK != 0
    }
}

pub(crate) fn read_u32(frame: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    frame
        .get(offset..end)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_ne_bytes)
}

pub(crate) fn read_u64(frame: &[u8], offset: usize) -> Option<u64> {
    let end = offset.checked_add(8)?;
    frame
        .get(offset..end)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_ne_bytes)
}

fn truncated(needed: usize, frame: &[u8]) -> HeaderDefect {
    HeaderDefect::Truncated {
        needed,
        actual: frame.len(),
    }
}

/// Declares the byte length of the struct it prefixes and its schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructHeader {
    pub num_bytes: u32,
    pub version: u32,
}

impl StructHeader {
    /// Read and version-check the struct header at the start of `frame`.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let num_bytes =
            read_u32(frame, 0).ok_or_else(|| truncated(STRUCT_HEADER_SIZE, frame))?;
        let version = read_u32(frame, 4).ok_or_else(|| truncated(STRUCT_HEADER_SIZE, frame))?;
        if version != STRUCT_VERSION {
            return Err(HeaderDefect::UnsupportedVersion(version).into());
        }
        Ok(Self { num_bytes, version })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_ne(self.num_bytes);
        dst.put_u32_ne(self.version);
    }
}

/// Struct header plus operation name and role flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub struct_header: StructHeader,
    pub name: u32,
    pub flags: u32,
}

impl MessageHeader {
    /// Bytes this header occupies on the wire, request id included.
    pub fn wire_size(&self) -> usize {
        if flags::has_request_id(self.flags) {
            REQUEST_HEADER_SIZE
        } else {
            MESSAGE_HEADER_SIZE
        }
    }

    pub fn expects_response(&self) -> bool {
        flags::has_flag(self.flags, flags::EXPECTS_RESPONSE)
    }

    pub fn is_response(&self) -> bool {
        flags::has_flag(self.flags, flags::IS_RESPONSE)
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        self.struct_header.encode(dst);
        dst.put_u32_ne(self.name);
        dst.put_u32_ne(self.flags);
    }
}

/// Message header extended with the correlation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMessageHeader {
    pub message_header: MessageHeader,
    pub request_id: u64,
}

impl RequestMessageHeader {
    pub fn encode(&self, dst: &mut BytesMut) {
        self.message_header.encode(dst);
        dst.put_u64_ne(self.request_id);
    }
}

/// A decoded header and where the body starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedHeader {
    pub header: MessageHeader,
    /// Present iff a role flag is set.
    pub request_id: Option<u64>,
    /// Offset of the first byte after the header.
    pub body_offset: usize,
}

/// Decode the message header at the start of `frame`.
///
/// Checks length and version and that the declared struct size lies between
/// the header size and the frame length. Role flags are returned as-is so
/// callers can apply their own policy.
pub fn decode_header(frame: &[u8]) -> Result<DecodedHeader> {
    let struct_header = StructHeader::decode(frame)?;

    let name = read_u32(frame, 8).ok_or_else(|| truncated(MESSAGE_HEADER_SIZE, frame))?;
    let flags = read_u32(frame, 12).ok_or_else(|| truncated(MESSAGE_HEADER_SIZE, frame))?;
    let header = MessageHeader {
        struct_header,
        name,
        flags,
    };

    let request_id = if flags::has_request_id(flags) {
        let request_id = read_u64(frame, MESSAGE_HEADER_SIZE)
            .ok_or_else(|| truncated(REQUEST_HEADER_SIZE, frame))?;
        Some(request_id)
    } else {
        None
    };

    let body_offset = header.wire_size();
    let declared = struct_header.num_bytes as usize;
    if declared < body_offset || declared > frame.len() {
        return Err(HeaderDefect::StructSizeOutOfRange {
            num_bytes: struct_header.num_bytes,
            min: body_offset,
            frame_len: frame.len(),
        }
        .into());
    }

    Ok(DecodedHeader {
        header,
        request_id,
        body_offset,
    })
}
