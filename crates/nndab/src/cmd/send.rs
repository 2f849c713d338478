use std::fs;
use std::time::Instant;

use nndab_sp::{Endpoint, RequestSocket};
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, sp_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat};

/// Exits with `FAILURE` when the bridge answers with one of its diagnostics.
pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint: Endpoint = args
        .endpoint
        .parse()
        .map_err(|err| sp_error("invalid endpoint", err))?;
    let timeout = parse_duration(&args.timeout)?;
    if timeout.is_zero() {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }
    let payload = resolve_payload(&args)?;

    let mut socket = RequestSocket::connect_with_timeout(&endpoint, timeout)
        .map_err(|err| sp_error("connect failed", err))?;
    socket
        .set_timeout(Some(timeout))
        .map_err(|err| sp_error("connect failed", err))?;

    let started = Instant::now();
    let reply = socket
        .request(&payload)
        .map_err(|err| sp_error("request failed", err))?;
    let elapsed = started.elapsed();
    debug!(size = reply.len(), ?elapsed, "reply received");

    let diagnostic = nndab_dispatch::is_diagnostic(&reply);
    print_reply(
        &args.endpoint,
        payload.len(),
        &reply,
        diagnostic,
        elapsed,
        format,
    );

    Ok(if diagnostic { FAILURE } else { SUCCESS })
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    Ok(Vec::new())
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .all(u8::is_ascii_hexdigit)
                .then(|| std::str::from_utf8(pair).ok())
                .flatten()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| {
                    CliError::new(
                        USAGE,
                        format!("--hex has invalid digits {:?}", String::from_utf8_lossy(pair)),
                    )
                })
        })
        .collect()
}
