//! Bus handles for the nndab bridge.
//!
//! A bus handle is anything that is `Read + Write` with one device transfer
//! per call. This crate provides the two handles the bridge ships with:
//! - [`I2cDevice`]: a Linux `i2c-dev` character device bound to one slave address
//! - [`SimulatedBus`]: an in-memory device with the same peek-then-consume quirk
//!
//! Everything above this layer (framing, flushing, dispatch) is generic over
//! `std::io::Read + std::io::Write` and never touches file descriptors.

pub mod error;
#[cfg(unix)]
pub mod i2c;
pub mod sim;

pub use error::{BusError, Result};
#[cfg(unix)]
pub use i2c::{I2cDevice, DEFAULT_ADDRESS, DEFAULT_DEVICE};
pub use sim::{BusStats, Responder, ScriptedRead, SimulatedBus};
