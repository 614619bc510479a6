use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use msgpipe_transport::DEFAULT_MAX_MESSAGE_SIZE;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod selftest;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bind a socket path and answer echo requests.
    Serve(ServeArgs),
    /// Connect to a socket path and send echo requests.
    Send(SendArgs),
    /// Run an echo exchange over an in-process pipe pair.
    Selftest(SelftestArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Selftest(args) => selftest::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Give up on an idle connection after this long (e.g. 5s, 500ms).
    #[arg(long, env = "MSGPIPE_DEADLINE")]
    pub deadline: Option<String>,
    /// Largest message accepted or sent, in bytes.
    #[arg(long, env = "MSGPIPE_MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
    /// Stop serving a connection after this many replies.
    #[arg(long)]
    pub max_exchanges: Option<u64>,
    /// Serve a single connection, print its summary, and exit.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// String payload to echo.
    #[arg(long)]
    pub data: String,
    /// Request id of the first request; later ones count up from it.
    #[arg(long, default_value_t = 1)]
    pub request_id: u64,
    /// Number of requests to send.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
    /// Maximum time to wait for each reply (e.g. 5s, 500ms).
    #[arg(long, env = "MSGPIPE_TIMEOUT", default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SelftestArgs {
    /// Number of echo exchanges before the close check.
    #[arg(long, default_value_t = 3)]
    pub rounds: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
