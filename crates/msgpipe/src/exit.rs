use std::fmt;
use std::io;

use msgpipe_echo::EchoError;
use msgpipe_frame::FrameError;
use msgpipe_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::MessageTooLarge { .. } | TransportError::EmptyMessage => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn echo_error(context: &str, err: EchoError) -> CliError {
    match err {
        EchoError::Transport(err) | EchoError::WriteFailure(err) => transport_error(context, err),
        EchoError::Frame(err) => frame_error(context, err),
        EchoError::CorrelationMismatch { .. } | EchoError::UnexpectedReply { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn maps_transport_errors_to_codes() {
        assert_eq!(
            transport_error("x", TransportError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(transport_error("x", TransportError::Closed).code, TRANSPORT_ERROR);
        assert_eq!(transport_error("x", TransportError::EmptyMessage).code, DATA_INVALID);
        assert_eq!(
            transport_error(
                "x",
                TransportError::Connect {
                    path: "/nope".into(),
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                }
            )
            .code,
            PERMISSION_DENIED
        );
    }

    #[test]
    fn maps_echo_errors_to_codes() {
        let err = echo_error(
            "call failed",
            EchoError::CorrelationMismatch {
                expected: 1,
                actual: 2,
            },
        );
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("call failed: "));

        let err = echo_error("call failed", EchoError::WriteFailure(TransportError::Closed));
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
