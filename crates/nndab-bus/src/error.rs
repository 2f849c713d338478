use std::path::PathBuf;

/// Errors that can occur while acquiring a bus handle.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Failed to open the bus device node.
    #[error("failed to open bus device {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to bind the handle to a slave address.
    #[error("failed to select address {address:#04x} on {path}: {source}")]
    Address {
        path: PathBuf,
        address: u16,
        source: std::io::Error,
    },

    /// The slave address does not fit in 7 bits.
    #[error("invalid i2c address {0:#x} (expected 7-bit address)")]
    InvalidAddress(u16),
}

pub type Result<T> = std::result::Result<T, BusError>;
