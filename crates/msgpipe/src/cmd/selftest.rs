use std::thread;

use msgpipe_echo::{EchoClient, EchoResponder, ServeSummary};
use msgpipe_transport::MessagePipe;
use tracing::{debug, info};

use crate::cmd::SelftestArgs;
use crate::exit::{echo_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_summary, OutputFormat};

/// Payload sent on every round.
const ROUND_PAYLOAD: &[u8] = b"CABB";

pub fn run(args: SelftestArgs, format: OutputFormat) -> CliResult<i32> {
    let summary = exchange_rounds(args.rounds)?;
    print_summary("selftest", &summary, format);
    Ok(SUCCESS)
}

/// Serve `rounds` requests from a worker thread, then check the close path.
fn exchange_rounds(rounds: u32) -> CliResult<ServeSummary> {
    let (client_end, server_end) =
        MessagePipe::create().map_err(|err| transport_error("pipe creation failed", err))?;

    let worker = thread::Builder::new()
        .name("selftest-responder".to_string())
        .spawn(move || EchoResponder::new(server_end).serve())
        .map_err(|err| crate::exit::io_error("spawn failed", err))?;

    let mut client = EchoClient::starting_at(client_end, 0);
    for round in 0..rounds {
        let echoed = client
            .echo(ROUND_PAYLOAD)
            .map_err(|err| echo_error("echo failed", err))?;
        if echoed.as_ref() != ROUND_PAYLOAD {
            return Err(CliError::new(
                FAILURE,
                format!("round {round}: payload came back altered"),
            ));
        }
        debug!(round, "selftest exchange ok");
    }

    // Closing our end must let the responder finish cleanly.
    drop(client);
    let summary = worker
        .join()
        .map_err(|_| CliError::new(INTERNAL, "responder thread panicked"))?
        .map_err(|err| echo_error("responder failed", err))?;

    if summary.served != u64::from(rounds) {
        return Err(CliError::new(
            FAILURE,
            format!("responder served {} of {rounds} requests", summary.served),
        ));
    }
    info!(rounds, "selftest passed");
    Ok(summary)
}
