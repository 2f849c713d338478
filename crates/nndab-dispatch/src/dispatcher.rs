use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bytes::Bytes;
use nndab_frame::{FrameError, FrameReader, FrameWriter, Flusher, HexBytes, ScratchBuffer};
use tracing::{debug, info, trace, warn};

use crate::channel::MessageChannel;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, Result};

/// Where the dispatcher is in its request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitRequest,
    FlushStale,
    WriteRequest,
    AwaitResponse,
    Reply,
}

/// Running totals over the lifetime of a [`Dispatcher`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransactionStats {
    /// Requests taken off the channel or passed to `transact`.
    pub requests: u64,
    /// Transactions that produced a device response.
    pub responses: u64,
    /// Transactions answered with a diagnostic, timeouts included.
    pub failures: u64,
    pub timeouts: u64,
    /// Stale frames discarded before writing a request.
    pub stale_frames: u64,
    /// Empty polls while waiting for responses.
    pub empty_polls: u64,
    /// Replies the channel failed to deliver.
    pub reply_failures: u64,
}

/// Moves requests from a [`MessageChannel`] to the bus and responses back.
///
/// The dispatcher is the only user of the bus handle and runs one transaction
/// at a time on the calling thread.
pub struct Dispatcher<B, C> {
    bus: B,
    channel: C,
    config: DispatchConfig,
    scratch: ScratchBuffer,
    flusher: Flusher,
    state: State,
    stats: TransactionStats,
}

impl<B, C> Dispatcher<B, C>
where
    B: Read + Write,
    C: MessageChannel,
{
    pub fn new(bus: B, channel: C, config: DispatchConfig) -> Self {
        let scratch = ScratchBuffer::new(config.response_capacity);
        let flusher = Flusher::with_capacity(config.flush_capacity).with_limit(config.flush_limit);
        Self {
            bus,
            channel,
            config,
            scratch,
            flusher,
            state: State::Idle,
            stats: TransactionStats::default(),
        }
    }

    /// Serve requests until `shutdown` is set.
    ///
    /// The flag is checked between transactions, so the channel should have a
    /// receive timeout for shutdown to be prompt. Only channel receive errors
    /// end the loop early.
    pub fn run(&mut self, shutdown: &AtomicBool) -> std::result::Result<(), C::Error> {
        info!(
            max_payload = self.config.max_payload(),
            response_capacity = self.config.response_capacity,
            max_polls = self.config.retry.max_polls,
            "dispatcher running"
        );

        while !shutdown.load(Ordering::SeqCst) {
            self.serve_one()?;
        }

        info!(
            requests = self.stats.requests,
            responses = self.stats.responses,
            failures = self.stats.failures,
            timeouts = self.stats.timeouts,
            "dispatcher stopped"
        );
        Ok(())
    }

    /// Wait for one request, run it and send its reply.
    ///
    /// Returns `Ok(false)` when the channel had nothing to deliver. A reply
    /// the channel cannot deliver is logged and counted, not returned.
    pub fn serve_one(&mut self) -> std::result::Result<bool, C::Error> {
        self.enter(State::AwaitRequest);
        let request = match self.channel.recv() {
            Ok(Some(request)) => request,
            Ok(None) => {
                self.enter(State::Idle);
                return Ok(false);
            }
            Err(err) => {
                self.enter(State::Idle);
                return Err(err);
            }
        };

        let outcome = self.transact(&request);

        self.enter(State::Reply);
        let sent = match &outcome {
            Ok(response) => self.channel.send(response),
            Err(err) => self.channel.send(err.diagnostic().as_bytes()),
        };
        if let Err(err) = sent {
            self.stats.reply_failures += 1;
            warn!(error = %err, "could not deliver reply");
        }

        self.enter(State::Idle);
        Ok(true)
    }

    /// Run one request through the bus and return the device's response.
    pub fn transact(&mut self, request: &[u8]) -> Result<Bytes> {
        self.stats.requests += 1;
        let started = Instant::now();

        let outcome = self.exchange(request);
        let elapsed_us = started.elapsed().as_micros() as u64;
        match &outcome {
            Ok(response) => {
                self.stats.responses += 1;
                info!(
                    request = request.len(),
                    response = response.len(),
                    elapsed_us,
                    "transaction complete"
                );
            }
            Err(err) => {
                self.stats.failures += 1;
                if err.is_timeout() {
                    self.stats.timeouts += 1;
                }
                warn!(
                    request = request.len(),
                    elapsed_us,
                    error = %err,
                    diagnostic = err.diagnostic(),
                    "transaction failed"
                );
            }
        }
        outcome
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Bytes> {
        let max = self.config.max_payload();
        if request.len() > max {
            return Err(DispatchError::MessageTooLarge {
                size: request.len(),
                max,
            });
        }

        self.enter(State::FlushStale);
        let report = self.flusher.flush(&mut self.bus);
        self.stats.stale_frames += report.frames as u64;

        self.enter(State::WriteRequest);
        debug!(size = request.len(), bytes = %HexBytes(request), "forwarding request");
        FrameWriter::with_max_payload(&mut self.bus, max)
            .write_frame(request)
            .map_err(DispatchError::Write)?;

        self.enter(State::AwaitResponse);
        self.await_response()
    }

    fn await_response(&mut self) -> Result<Bytes> {
        let policy = self.config.retry;
        let budget = policy.max_polls.max(1);
        let started = Instant::now();
        let mut reader = FrameReader::new(&mut self.bus);
        let mut polls = 0usize;

        loop {
            self.scratch.reset();
            match reader.read_frame(&mut self.scratch) {
                Ok(frame) => {
                    debug!(
                        polls,
                        size = frame.len(),
                        bytes = %HexBytes(frame.payload()),
                        "response received"
                    );
                    return Ok(frame.to_bytes());
                }
                Err(FrameError::NoData) => {
                    polls += 1;
                    self.stats.empty_polls += 1;
                    let elapsed = started.elapsed();
                    let expired = policy.deadline.is_some_and(|deadline| elapsed >= deadline);
                    if polls >= budget || expired {
                        return Err(DispatchError::Timeout { polls, elapsed });
                    }
                    trace!(polls, "no response yet");
                    if !policy.poll_interval.is_zero() {
                        std::thread::sleep(policy.poll_interval);
                    }
                }
                Err(err) => return Err(DispatchError::Read(err)),
            }
        }
    }

    fn enter(&mut self, next: State) {
        trace!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> &TransactionStats {
        &self.stats
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Borrow the bus handle.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutably borrow the bus handle.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Borrow the message channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Consume the dispatcher and return its bus and channel.
    pub fn into_parts(self) -> (B, C) {
        (self.bus, self.channel)
    }
}

impl<B, C> std::fmt::Debug for Dispatcher<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}
