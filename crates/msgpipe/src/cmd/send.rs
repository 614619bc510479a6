use std::time::Instant;

use msgpipe_echo::EchoClient;
use msgpipe_frame::{Message, StringPayload};
use msgpipe_transport::{MessageChannel, MessagePipeListener, PipeConfig};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{echo_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = PipeConfig {
        wait_deadline: Some(timeout),
        ..PipeConfig::default()
    };
    let pipe = MessagePipeListener::connect_with_config(&args.path, config)
        .map_err(|err| transport_error("connect failed", err))?;

    let mut client = EchoClient::starting_at(pipe, args.request_id);
    send_requests(&mut client, args.data.as_bytes(), args.repeat, |reply, elapsed| {
        print_reply(reply, elapsed, format)
    })?;

    Ok(SUCCESS)
}

/// Run `repeat` echo calls, handing each reply and its round-trip time to `on_reply`.
fn send_requests<C, F>(
    client: &mut EchoClient<C>,
    data: &[u8],
    repeat: u32,
    mut on_reply: F,
) -> CliResult<()>
where
    C: MessageChannel,
    F: FnMut(&Message, std::time::Duration),
{
    for _ in 0..repeat {
        let request_id = client.next_request_id();
        let started = Instant::now();
        let reply = client
            .call(request_id, StringPayload::new(data.to_vec()))
            .map_err(|err| echo_error("echo failed", err))?;
        on_reply(&reply, started.elapsed());
    }
    Ok(())
}
