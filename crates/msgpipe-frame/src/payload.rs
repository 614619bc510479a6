use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::read_u32;

/// String payload header: num_bytes (4) + num_elems (4).
pub const ARRAY_HEADER_SIZE: usize = 8;

/// Length-prefixed byte array carried after the message header.
///
/// `num_elems` travels separately from the byte count; for strings the two
/// are equal, but the codec never assumes so.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringPayload {
    pub num_elems: u32,
    pub bytes: Bytes,
}

impl StringPayload {
    /// A payload whose element count equals its byte count.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            num_elems: bytes.len() as u32,
            bytes,
        }
    }

    /// A payload with an explicit element count.
    pub fn with_elems(bytes: impl Into<Bytes>, num_elems: u32) -> Self {
        Self {
            num_elems,
            bytes: bytes.into(),
        }
    }

    /// Declared byte count.
    pub fn num_bytes(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Bytes this payload occupies on the wire, before alignment padding.
    pub fn wire_size(&self) -> usize {
        ARRAY_HEADER_SIZE + self.bytes.len()
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Decode the payload starting at `offset`.
    ///
    /// Every field is range-checked against the frame; a declared byte count
    /// that runs past the end is rejected rather than read.
    pub fn decode(frame: &Bytes, offset: usize) -> Result<Self> {
        let missing = || FrameError::MissingPayload {
            needed: offset.saturating_add(ARRAY_HEADER_SIZE),
            frame_len: frame.len(),
        };
        let num_bytes = read_u32(frame, offset).ok_or_else(missing)?;
        let num_elems = read_u32(frame, offset + 4).ok_or_else(missing)?;

        let start = offset + ARRAY_HEADER_SIZE;
        let out_of_bounds = FrameError::PayloadOutOfBounds {
            offset: start,
            num_bytes,
            frame_len: frame.len(),
        };
        let end = start
            .checked_add(num_bytes as usize)
            .ok_or_else(|| out_of_bounds.clone())?;
        if end > frame.len() {
            return Err(out_of_bounds);
        }

        Ok(Self {
            num_elems,
            bytes: frame.slice(start..end),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_ne(self.num_bytes());
        dst.put_u32_ne(self.num_elems);
        dst.put_slice(&self.bytes);
    }
}
