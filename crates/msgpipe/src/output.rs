use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use msgpipe_echo::ServeSummary;
use msgpipe_frame::Message;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput {
    request_id: u64,
    flags: u32,
    struct_num_bytes: u32,
    num_elems: u32,
    payload_size: usize,
    payload: String,
    round_trip_us: u128,
    timestamp: String,
}

impl ReplyOutput {
    fn new(reply: &Message, elapsed: Duration) -> Self {
        Self {
            request_id: reply.request_id.unwrap_or_default(),
            flags: reply.header.flags,
            struct_num_bytes: reply.header.struct_header.num_bytes,
            num_elems: reply.payload.num_elems,
            payload_size: reply.payload.bytes.len(),
            payload: payload_preview(reply.payload.bytes.as_ref()),
            round_trip_us: elapsed.as_micros(),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_reply(reply: &Message, elapsed: Duration, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput::new(reply, elapsed);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let out = ReplyOutput::new(reply, elapsed);
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["REQUEST", "FLAGS", "SIZE", "RTT (us)", "PAYLOAD"])
                .add_row(vec![
                    out.request_id.to_string(),
                    format!("{:#x}", out.flags),
                    out.payload_size.to_string(),
                    out.round_trip_us.to_string(),
                    out.payload,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "request={} flags={:#x} size={} rtt={:?} payload={}",
                reply.request_id.unwrap_or_default(),
                reply.header.flags,
                reply.payload.bytes.len(),
                elapsed,
                payload_preview(reply.payload.bytes.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(reply.payload.bytes.as_ref());
        }
    }
}

#[derive(Serialize)]
struct SummaryOutput<'a> {
    source: &'a str,
    served: u64,
    rejected: u64,
    dropped: u64,
}

pub fn print_summary(source: &str, summary: &ServeSummary, format: OutputFormat) {
    let out = SummaryOutput {
        source,
        served: summary.served,
        rejected: summary.rejected,
        dropped: summary.dropped,
    };
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "SERVED", "REJECTED", "DROPPED"])
                .add_row(vec![
                    out.source.to_string(),
                    out.served.to_string(),
                    out.rejected.to_string(),
                    out.dropped.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "{}: served={} rejected={} dropped={}",
            out.source, out.served, out.rejected, out.dropped
        ),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
