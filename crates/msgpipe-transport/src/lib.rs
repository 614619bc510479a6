//! Message-oriented duplex pipe endpoints.
//!
//! A [`MessagePipe`] carries whole messages in both directions and reports
//! when a message is pending or the peer has gone away:
//! - `create()` returns a connected pair (`socketpair(2)`, `SOCK_SEQPACKET`)
//! - [`MessagePipeListener`] binds the same endpoint type to a filesystem path
//!
//! This is the lowest layer of msgpipe. The frame codec and the echo
//! responder only ever see the [`MessageChannel`] trait defined here.

pub mod config;
pub mod error;
pub mod traits;

#[cfg(target_os = "linux")]
mod sys;

#[cfg(target_os = "linux")]
pub mod pipe;

#[cfg(target_os = "linux")]
pub mod listener;

#[cfg(all(target_os = "linux", feature = "async"))]
pub mod nonblocking;

pub use config::{PipeConfig, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{Result, TransportError};
pub use traits::{MessageChannel, Readiness};

#[cfg(target_os = "linux")]
pub use listener::MessagePipeListener;
#[cfg(target_os = "linux")]
pub use pipe::MessagePipe;

#[cfg(all(target_os = "linux", feature = "async"))]
pub use nonblocking::AsyncMessagePipe;
