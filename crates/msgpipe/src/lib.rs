//! Message-oriented pipes with a struct-header echo protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: duplex message pipes, listeners, readiness waits
//! - [`frame`]: struct/message header codec and echo request validation
//! - [`echo`]: echo responder state machine and client

/// Re-export transport types.
pub mod transport {
    pub use msgpipe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use msgpipe_frame::*;
}

/// Re-export echo types.
pub mod echo {
    pub use msgpipe_echo::*;
}
