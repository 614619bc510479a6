/// Structural problems with the struct or message header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderDefect {
    /// The frame ends before the header does.
    #[error("frame too short for header ({actual} bytes, need {needed})")]
    Truncated { needed: usize, actual: usize },

    /// The struct header declares a version other than 1.
    #[error("unsupported struct version {0} (expected 1)")]
    UnsupportedVersion(u32),

    /// The struct header's `num_bytes` is smaller than the header or larger than the frame.
    #[error("struct size {num_bytes} outside [{min}, {frame_len}]")]
    StructSizeOutOfRange {
        num_bytes: u32,
        min: usize,
        frame_len: usize,
    },

    /// Both role flags are set on one message.
    #[error("message claims to be both request and response (flags {0:#x})")]
    ConflictingRoles(u32),
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The struct or message header is malformed.
    #[error("invalid header: {0}")]
    InvalidHeader(#[from] HeaderDefect),

    /// The message names an operation this codec does not serve.
    #[error("unknown operation {0}")]
    UnknownOperation(u32),

    /// The role flags are not the ones this exchange accepts.
    #[error("unexpected message flags {flags:#x} (expected {expected:#x})")]
    UnexpectedFlags { flags: u32, expected: u32 },

    /// The frame ends before the string payload header.
    #[error("frame too short for payload header ({frame_len} bytes, need {needed})")]
    MissingPayload { needed: usize, frame_len: usize },

    /// The string payload declares more bytes than the frame holds.
    #[error("payload of {num_bytes} bytes at offset {offset} overruns {frame_len}-byte frame")]
    PayloadOutOfBounds {
        offset: usize,
        num_bytes: u32,
        frame_len: usize,
    },

    /// The encoded message would not fit the 32-bit size fields.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A padded encode was asked for fewer bytes than the message needs.
    #[error("padded length {requested} is smaller than the encoded message ({needed} bytes)")]
    PaddingTooSmall { needed: usize, requested: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
