use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{BusError, Result};

/// Device node the DAB module is wired to on the reference board.
pub const DEFAULT_DEVICE: &str = "/dev/i2c-2";

/// Slave address of the DAB module on the reference board.
pub const DEFAULT_ADDRESS: u16 = 0x75;

/// `I2C_SLAVE` request from `linux/i2c-dev.h`.
#[cfg(target_os = "linux")]
const I2C_SLAVE: u32 = 0x0703;

const MAX_7BIT_ADDRESS: u16 = 0x7f;

/// An open `i2c-dev` handle bound to a single slave address.
///
/// Every `read` and `write` call maps to exactly one bus transfer, so the
/// returned byte counts are the counts the driver reported. Short transfers
/// are never retried here; framing decides what a short count means.
pub struct I2cDevice {
    file: File,
    path: PathBuf,
    address: u16,
}

impl I2cDevice {
    /// Open `path` read/write and select `address` as the slave for all
    /// subsequent transfers.
    pub fn open(path: impl AsRef<Path>, address: u16) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if address > MAX_7BIT_ADDRESS {
            return Err(BusError::InvalidAddress(address));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| BusError::Open {
                path: path.clone(),
                source,
            })?;

        select_slave(&file, address).map_err(|source| BusError::Address {
            path: path.clone(),
            address,
            source,
        })?;

        info!(?path, address, "opened i2c device");

        Ok(Self {
            file,
            path,
            address,
        })
    }

    /// The device node this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The selected slave address.
    pub fn address(&self) -> u16 {
        self.address
    }
}

#[cfg(target_os = "linux")]
fn select_slave(file: &File, address: u16) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: `file` owns an open descriptor for the lifetime of this call and
    // I2C_SLAVE takes its argument by value, so no pointers are passed.
    let rc = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            I2C_SLAVE as _,
            libc::c_ulong::from(address),
        )
    };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    debug!(address, "selected i2c slave");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn select_slave(_file: &File, _address: u16) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "i2c-dev slave selection is only available on Linux",
    ))
}

impl Read for I2cDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for I2cDevice {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl std::fmt::Debug for I2cDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cDevice")
            .field("path", &self.path)
            .field("address", &format_args!("{:#04x}", self.address))
            .finish()
    }
}
