use nndab_bus::I2cDevice;
use nndab_frame::Flusher;

use crate::cmd::FlushArgs;
use crate::exit::{bus_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_flush_report, OutputFormat};

/// Exits with `FAILURE` if the queue was still not empty at the read limit.
pub fn run(args: FlushArgs, format: OutputFormat) -> CliResult<i32> {
    let mut device =
        I2cDevice::open(&args.device, args.address).map_err(|err| bus_error("open failed", err))?;

    let report = Flusher::new().with_limit(args.limit).flush(&mut device);
    print_flush_report(&args.device, args.address, &report, format);

    Ok(if report.drained { SUCCESS } else { FAILURE })
}
