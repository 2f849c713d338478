//! The bridge state machine.
//!
//! A [`Dispatcher`] owns one bus handle and one [`MessageChannel`] and runs
//! strictly sequential transactions:
//!
//! ```text
//! Idle → AwaitRequest → FlushStale → WriteRequest → AwaitResponse → Reply → Idle
//! ```
//!
//! Every request gets exactly one reply. Failures are carried as
//! [`DispatchError`] and only rendered to their wire diagnostic when the reply
//! is sent, so no failure ever stops the loop.

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;

pub use channel::MessageChannel;
pub use config::{DispatchConfig, RetryPolicy, DEFAULT_DEADLINE, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL};
pub use dispatcher::{Dispatcher, State, TransactionStats};
pub use error::{is_diagnostic, DispatchError, Result};
