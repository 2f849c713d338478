use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::BusKind;
use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod flush;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge.
    Serve(ServeArgs),
    /// Send one request to a bridge and print the reply.
    Send(SendArgs),
    /// Drain queued frames from the module.
    Flush(FlushArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Flush(args) => flush::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// JSON config file. Flags below override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// I2C device node.
    #[arg(long, value_name = "PATH")]
    pub device: Option<PathBuf>,
    /// 7-bit slave address (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_address)]
    pub address: Option<u16>,
    /// Endpoint to bind (repeatable), e.g. ipc:///tmp/nndab or tcp://0.0.0.0:12000.
    #[arg(long = "bind", value_name = "ENDPOINT")]
    pub bind: Vec<String>,
    /// Bus handle to drive.
    #[arg(long, value_enum)]
    pub bus: Option<BusKind>,
    /// Empty polls allowed while waiting for a response.
    #[arg(long)]
    pub retries: Option<usize>,
    /// Pause between empty polls (e.g. 500us, 1ms).
    #[arg(long, value_name = "DURATION")]
    pub poll_interval: Option<String>,
    /// Wall-clock bound per response (e.g. 30s), or "off".
    #[arg(long, value_name = "DURATION")]
    pub deadline: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Bridge endpoint, e.g. ipc:///cache/nndab or tcp://host:12000.
    pub endpoint: String,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["file", "hex"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Payload as hex digits; spaces are ignored.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "35s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct FlushArgs {
    /// I2C device node.
    #[arg(long, value_name = "PATH", default_value = nndab_bus::DEFAULT_DEVICE)]
    pub device: PathBuf,
    /// 7-bit slave address (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_address, default_value = "0x75")]
    pub address: u16,
    /// Give up after this many frame reads.
    #[arg(long, default_value_t = nndab_frame::DEFAULT_FLUSH_LIMIT)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500us`, `20ms`, `3s` or a bare number of seconds. Zero is allowed.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, micros_per_unit) = if let Some(num) = input.strip_suffix("us") {
        (num, 1)
    } else if let Some(num) = input.strip_suffix("ms") {
        (num, 1_000)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, 1_000_000)
    } else {
        (input, 1_000_000)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    let micros = value
        .checked_mul(micros_per_unit)
        .ok_or_else(|| CliError::new(USAGE, format!("duration out of range: {input}")))?;
    Ok(Duration::from_micros(micros))
}

fn parse_address(input: &str) -> Result<u16, String> {
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid address {input:?}: {err}"))
}
