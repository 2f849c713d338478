use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nndab_bus::{I2cDevice, SimulatedBus};
use nndab_dispatch::{DispatchConfig, Dispatcher};
use nndab_sp::{ReplySocket, SocketConfig};
use tracing::info;

use crate::cmd::ServeArgs;
use crate::config::{BridgeConfig, BusKind};
use crate::exit::{bus_error, sp_error, CliError, CliResult, INTERNAL, SUCCESS};

/// How often an idle bridge checks for Ctrl-C.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    config.apply(&args);

    let dispatch_config = config.dispatch_config()?;
    let endpoints = config.endpoints()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&shutdown))?;

    match config.bus {
        BusKind::I2c => {
            let device = I2cDevice::open(&config.device, config.address)
                .map_err(|err| bus_error("open failed", err))?;
            serve(device, &endpoints, dispatch_config, &shutdown)
        }
        BusKind::Sim => {
            info!("using simulated echo module");
            serve(SimulatedBus::echo(), &endpoints, dispatch_config, &shutdown)
        }
    }
}

fn serve<B: Read + Write>(
    bus: B,
    endpoints: &[nndab_sp::Endpoint],
    config: DispatchConfig,
    shutdown: &AtomicBool,
) -> CliResult<i32> {
    let socket = ReplySocket::bind_with_config(
        endpoints,
        SocketConfig {
            recv_timeout: Some(SHUTDOWN_POLL),
            ..SocketConfig::default()
        },
    )
    .map_err(|err| sp_error("bind failed", err))?;
    for endpoint in socket.endpoints() {
        info!(%endpoint, "bridge listening");
    }

    let mut dispatcher = Dispatcher::new(bus, socket, config);
    dispatcher
        .run(shutdown)
        .map_err(|err| sp_error("receive failed", err))?;

    Ok(SUCCESS)
}

fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
