use std::io::{IsTerminal, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nndab_frame::{FlushReport, HexBytes};
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
struct ReplyOutput<'a> {
    endpoint: &'a str,
    request_size: usize,
    reply_size: usize,
    diagnostic: bool,
    payload: String,
    payload_hex: String,
    elapsed_ms: u128,
    timestamp: String,
}

/// Print a bridge reply. Raw output writes the payload bytes unchanged.
pub fn print_reply(
    endpoint: &str,
    request_size: usize,
    reply: &[u8],
    diagnostic: bool,
    elapsed: Duration,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                endpoint,
                request_size,
                reply_size: reply.len(),
                diagnostic,
                payload: payload_preview(reply),
                payload_hex: HexBytes(reply).to_string(),
                elapsed_ms: elapsed.as_millis(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENDPOINT", "SIZE", "ELAPSED", "REPLY"])
                .add_row(vec![
                    endpoint.to_string(),
                    reply.len().to_string(),
                    format!("{}ms", elapsed.as_millis()),
                    payload_preview(reply),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "endpoint={} size={} elapsed={}ms{} reply={}",
                endpoint,
                reply.len(),
                elapsed.as_millis(),
                if diagnostic { " (bridge error)" } else { "" },
                payload_preview(reply)
            );
        }
        OutputFormat::Raw => print_raw(reply),
    }
}

#[derive(Serialize)]
struct FlushOutput<'a> {
    device: String,
    address: &'a str,
    reads: usize,
    frames: usize,
    errors: usize,
    drained: bool,
    timestamp: String,
}

pub fn print_flush_report(device: &Path, address: u16, report: &FlushReport, format: OutputFormat) {
    let address = format!("{address:#04x}");
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = FlushOutput {
                device: device.display().to_string(),
                address: &address,
                reads: report.reads,
                frames: report.frames,
                errors: report.errors,
                drained: report.drained,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "ADDRESS", "READS", "FRAMES", "ERRORS", "DRAINED"])
                .add_row(vec![
                    device.display().to_string(),
                    address,
                    report.reads.to_string(),
                    report.frames.to_string(),
                    report.errors.to_string(),
                    report.drained.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "device={} address={} reads={} frames={} errors={} drained={}",
                device.display(),
                address,
                report.reads,
                report.frames,
                report.errors,
                report.drained
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Module responses are mostly binary; text is shown as-is, anything else as hex.
fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(|c| c.is_control()) => text.to_string(),
        _ => format!("<{} bytes: {}>", payload.len(), HexBytes(payload)),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
