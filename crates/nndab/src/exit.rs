use std::fmt;
use std::io;

use nndab_bus::BusError;
use nndab_sp::SpError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn sp_error(context: &str, err: SpError) -> CliError {
    match err {
        SpError::Bind { source, .. } | SpError::Connect { source, .. } | SpError::Io(source) => {
            io_error(context, source)
        }
        SpError::InvalidEndpoint(_) | SpError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        SpError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SpError::Disconnected | SpError::Closed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn bus_error(context: &str, err: BusError) -> CliError {
    match err {
        BusError::Open { source, .. } | BusError::Address { source, .. } => {
            io_error(context, source)
        }
        BusError::InvalidAddress(_) => CliError::new(USAGE, format!("{context}: {err}")),
    }
}
