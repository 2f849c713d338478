use std::time::Duration;

use nndab_frame::{
    DEFAULT_FLUSH_LIMIT, DEFAULT_FRAME_CAPACITY, DEFAULT_RESPONSE_CAPACITY, HEADER_SIZE,
    MIN_FLUSH_CAPACITY,
};

/// Empty polls allowed while waiting for a response. The module typically
/// needs a few hundred after a state change.
pub const DEFAULT_MAX_POLLS: usize = 10_000;

/// Pause between empty polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Wall-clock bound on waiting for one response.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// How long to keep polling for a response after a request was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Empty polls before giving up. Zero is treated as one.
    pub max_polls: usize,
    /// Sleep after each empty poll. Zero polls back to back.
    pub poll_interval: Duration,
    /// Give up once this much time has passed, whatever the poll count.
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Poll back to back with no deadline; only the poll budget applies.
    pub fn immediate(max_polls: usize) -> Self {
        Self {
            max_polls,
            poll_interval: Duration::ZERO,
            deadline: None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_polls: DEFAULT_MAX_POLLS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: Some(DEFAULT_DEADLINE),
        }
    }
}

/// Buffer sizes and limits for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Outbound frame size, header included. Bounds the request payload.
    pub frame_capacity: usize,
    /// Scratch space for one inbound response frame, header included.
    pub response_capacity: usize,
    /// Scratch space used while flushing stale frames.
    pub flush_capacity: usize,
    /// Frame reads per flush before giving up on an empty queue.
    pub flush_limit: usize,
    pub retry: RetryPolicy,
}

impl DispatchConfig {
    /// Largest request payload the bridge forwards.
    pub fn max_payload(&self) -> usize {
        self.frame_capacity
            .saturating_sub(HEADER_SIZE)
            .min(usize::from(u16::MAX))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            response_capacity: DEFAULT_RESPONSE_CAPACITY,
            flush_capacity: MIN_FLUSH_CAPACITY,
            flush_limit: DEFAULT_FLUSH_LIMIT,
            retry: RetryPolicy::default(),
        }
    }
}
