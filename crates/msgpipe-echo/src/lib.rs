//! Echo request/response over msgpipe channels.
//!
//! [`EchoResponder`] answers each echo request with a reply carrying the same
//! correlation id and payload. [`EchoClient`] is the other side: it issues
//! requests and checks that replies pair up.
//!
//! Both are generic over [`msgpipe_transport::MessageChannel`], so they run
//! on a real [`msgpipe_transport::MessagePipe`] or on an in-memory script.

pub mod client;
pub mod config;
pub mod error;
pub mod responder;

#[cfg(feature = "async")]
pub mod nonblocking;

pub use client::EchoClient;
pub use config::ResponderConfig;
pub use error::{EchoError, Result};
pub use responder::{build_reply, EchoResponder, Exchange, ExchangeState, ServeSummary};

#[cfg(feature = "async")]
pub use nonblocking::AsyncEchoResponder;
