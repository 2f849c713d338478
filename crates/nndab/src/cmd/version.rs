use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("nndab {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: nndab");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("NNDAB_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("NNDAB_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "defaults: device={} address={:#04x} endpoints={},{}",
        nndab_bus::DEFAULT_DEVICE,
        nndab_bus::DEFAULT_ADDRESS,
        nndab_sp::DEFAULT_IPC_ENDPOINT,
        nndab_sp::DEFAULT_TCP_ENDPOINT
    );
    println!(
        "limits: max_payload={} response_capacity={} retries={}",
        nndab_frame::DEFAULT_MAX_PAYLOAD,
        nndab_frame::DEFAULT_RESPONSE_CAPACITY,
        nndab_dispatch::DEFAULT_MAX_POLLS
    );

    Ok(SUCCESS)
}
