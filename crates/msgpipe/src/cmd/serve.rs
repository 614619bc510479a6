use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use msgpipe_echo::{EchoError, EchoResponder, Exchange, ResponderConfig, ServeSummary};
use msgpipe_transport::{MessagePipe, MessagePipeListener, PipeConfig, TransportError};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{echo_error, io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_summary, OutputFormat};

/// How often a blocked accept or readiness wait rechecks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = responder_config(&args)?;
    let listener = MessagePipeListener::bind(&args.path)
        .map_err(|err| transport_error("bind failed", err))?
        .with_config(config.pipe.clone());

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;
    info!(path = ?listener.path(), once = args.once, "serving echo requests");

    let mut connections = 0u64;
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    while running.load(Ordering::SeqCst) {
        let pipe = match listener.accept_timeout(SHUTDOWN_POLL) {
            Ok(Some(pipe)) => pipe,
            Ok(None) => continue,
            Err(err) => return Err(transport_error("accept failed", err)),
        };
        connections += 1;

        if args.once {
            let summary = serve_connection(pipe, &config, &running)
                .map_err(|err| echo_error("serve failed", err))?;
            print_summary("connection-1", &summary, format);
            return Ok(SUCCESS);
        }

        workers.retain(|worker| !worker.is_finished());
        let config = config.clone();
        let running = running.clone();
        let worker = thread::Builder::new()
            .name(format!("conn-{connections}"))
            .spawn(move || report(serve_connection(pipe, &config, &running)))
            .map_err(|err| io_error("spawn failed", err))?;
        workers.push(worker);
    }

    workers.retain(|worker| !worker.is_finished());
    info!(
        connections,
        open = workers.len(),
        "shutting down; waiting for open connections"
    );
    for worker in workers {
        if worker.join().is_err() {
            warn!("connection thread panicked");
        }
    }
    Ok(SUCCESS)
}

fn responder_config(args: &ServeArgs) -> CliResult<ResponderConfig> {
    let wait_deadline = args.deadline.as_deref().map(parse_duration).transpose()?;
    Ok(ResponderConfig {
        pipe: PipeConfig {
            max_message_size: args.max_message_size,
            wait_deadline,
        },
        max_exchanges: args.max_exchanges,
    })
}

/// Serve one connection until the peer closes, the idle deadline passes, or
/// `running` is cleared.
///
/// Readiness waits are sliced into [`SHUTDOWN_POLL`] steps so the flag is
/// seen even while the peer sits idle; `config.pipe.wait_deadline` still
/// bounds the total idle time between exchanges.
fn serve_connection(
    pipe: MessagePipe,
    config: &ResponderConfig,
    running: &AtomicBool,
) -> msgpipe_echo::Result<ServeSummary> {
    let idle_limit = config.pipe.wait_deadline;
    let pipe_config = PipeConfig {
        wait_deadline: Some(idle_limit.map_or(SHUTDOWN_POLL, |limit| limit.min(SHUTDOWN_POLL))),
        ..config.pipe.clone()
    };
    let mut responder = EchoResponder::with_config(pipe.with_config(pipe_config), config.clone());

    let mut summary = ServeSummary::default();
    let mut last_activity = Instant::now();
    while config
        .max_exchanges
        .is_none_or(|limit| summary.served < limit)
    {
        match responder.serve_one() {
            Ok(Exchange::Closed) => break,
            Ok(exchange) => {
                summary.record(&exchange);
                last_activity = Instant::now();
            }
            Err(EchoError::Transport(TransportError::Timeout(_))) => {
                if !running.load(Ordering::SeqCst) {
                    debug!("shutdown requested; leaving connection");
                    break;
                }
                if let Some(limit) = idle_limit {
                    if last_activity.elapsed() >= limit {
                        return Err(TransportError::Timeout(limit).into());
                    }
                }
            }
            Err(err) => return Err(err),
        }
    }
    Ok(summary)
}

fn report(result: msgpipe_echo::Result<ServeSummary>) {
    match result {
        Ok(summary) => info!(
            served = summary.served,
            rejected = summary.rejected,
            dropped = summary.dropped,
            "connection finished"
        ),
        Err(EchoError::Transport(TransportError::Timeout(limit))) => {
            info!(?limit, "closing idle connection")
        }
        Err(err) if err.is_closed() => info!(error = %err, "peer went away mid-exchange"),
        Err(err) => warn!(error = %err, "connection failed"),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use msgpipe_echo::EchoClient;

    use super::*;

    fn args(deadline: Option<&str>) -> ServeArgs {
        ServeArgs {
            path: "/tmp/unused.sock".into(),
            deadline: deadline.map(str::to_owned),
            max_message_size: 1024,
            max_exchanges: Some(2),
            once: false,
        }
    }

    #[test]
    fn builds_responder_config_from_flags() {
        let config = responder_config(&args(Some("250ms"))).unwrap();
        assert_eq!(config.pipe.max_message_size, 1024);
        assert_eq!(config.pipe.wait_deadline, Some(Duration::from_millis(250)));
        assert_eq!(config.max_exchanges, Some(2));
    }

    #[test]
    fn rejects_bad_deadline() {
        let err = responder_config(&args(Some("soon"))).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[test]
    fn serves_a_connection_to_completion() {
        let (client, server) = MessagePipe::create().unwrap();
        let running = AtomicBool::new(true);
        let worker = thread::spawn(move || {
            serve_connection(server, &ResponderConfig::default(), &running).unwrap()
        });

        let mut client = EchoClient::new(client);
        client.echo("one").unwrap();
        client.echo("two").unwrap();
        drop(client);

        assert_eq!(worker.join().unwrap().served, 2);
    }

    #[test]
    fn cleared_flag_releases_idle_connection() {
        let (_client, server) = MessagePipe::create().unwrap();
        let running = AtomicBool::new(false);

        let started = Instant::now();
        let summary = serve_connection(server, &ResponderConfig::default(), &running).unwrap();
        assert_eq!(summary, ServeSummary::default());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn idle_deadline_still_applies_across_polls() {
        let (_client, server) = MessagePipe::create().unwrap();
        let running = AtomicBool::new(true);
        let config = ResponderConfig {
            pipe: PipeConfig {
                wait_deadline: Some(Duration::from_millis(450)),
                ..PipeConfig::default()
            },
            max_exchanges: None,
        };

        let started = Instant::now();
        let err = serve_connection(server, &config, &running).unwrap_err();
        assert!(matches!(
            err,
            EchoError::Transport(TransportError::Timeout(limit)) if limit == Duration::from_millis(450)
        ));
        assert!(started.elapsed() >= Duration::from_millis(450));
    }
}
