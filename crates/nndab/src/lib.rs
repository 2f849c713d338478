//! Bridge between nanomsg REQ clients and an I2C-attached DAB radio module.
//!
//! Clients send raw module commands over a scalability-protocols REQ socket;
//! the bridge frames each one onto the bus, waits for the module's answer and
//! replies with it. Transactions are strictly sequential.
//!
//! # Crate Structure
//!
//! - [`bus`]: Bus handles for Linux `i2c-dev` and an in-memory simulated module
//! - [`frame`]: Peek-then-consume length-prefixed framing and queue flushing
//! - [`sp`]: nanomsg-compatible REQ/REP sockets over `ipc://` and `tcp://`
//! - [`dispatch`]: The request/response state machine tying them together

/// Re-export bus handles.
pub mod bus {
    pub use nndab_bus::*;
}

/// Re-export framing types.
pub mod frame {
    pub use nndab_frame::*;
}

/// Re-export scalability-protocols sockets.
pub mod sp {
    pub use nndab_sp::*;
}

/// Re-export the dispatcher.
pub mod dispatch {
    pub use nndab_dispatch::*;
}
