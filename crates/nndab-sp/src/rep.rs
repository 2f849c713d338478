use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::codec::{read_message, write_message, DEFAULT_MAX_MESSAGE_SIZE, PROTO_REP};
use crate::endpoint::Endpoint;
use crate::error::{Result, SpError};
use crate::handshake::handshake;
use crate::listener::{Listener, SocketPathGuard};
use crate::stream::SpStream;

/// Backtrace words a request may carry before it is considered malformed.
pub const MAX_HOPS: usize = 32;

const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Behaviour shared by every connection of a socket.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Timeout for the protocol header exchange on new connections.
    pub handshake_timeout: Duration,
    /// Largest inbound message; larger ones drop the connection.
    pub max_message_size: usize,
    /// How long `recv` waits before returning `Ok(None)`. `None` blocks forever.
    pub recv_timeout: Option<Duration>,
    /// Bound on writing one reply. A peer that does not drain its replies in
    /// time is dropped. `None` blocks forever.
    pub send_timeout: Option<Duration>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            recv_timeout: None,
            send_timeout: Some(Duration::from_secs(5)),
        }
    }
}

type PipeId = u64;
type Pipes = Arc<Mutex<HashMap<PipeId, Peer>>>;

/// Write half of a connection plus the signal that lets its reader forward
/// the next request.
struct Peer {
    stream: Arc<SpStream>,
    ready: SyncSender<()>,
}

struct Incoming {
    pipe: PipeId,
    backtrace: Bytes,
    payload: Bytes,
}

struct Pending {
    pipe: PipeId,
    backtrace: Bytes,
}

/// A REP socket bound to one or more endpoints.
///
/// Connections are accepted and read on background threads; requests from
/// all of them are queued in arrival order. Each [`recv`](Self::recv) must be
/// followed by one [`send`](Self::send), which routes the reply back to the
/// connection the request came from.
///
/// Each connection has at most one request queued or awaiting its reply;
/// the next one is read but held back until the reply has been written.
/// Dropping the socket stops the accept threads and closes every connection.
pub struct ReplySocket {
    incoming: Receiver<Incoming>,
    pipes: Pipes,
    pending: Option<Pending>,
    endpoints: Vec<Endpoint>,
    recv_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    closed: Arc<AtomicBool>,
    _guards: Vec<SocketPathGuard>,
}

impl ReplySocket {
    /// Bind every endpoint with default configuration.
    pub fn bind(endpoints: &[Endpoint]) -> Result<Self> {
        Self::bind_with_config(endpoints, SocketConfig::default())
    }

    /// Bind every endpoint. Fails on the first endpoint that cannot be bound.
    pub fn bind_with_config(endpoints: &[Endpoint], config: SocketConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let pipes: Pipes = Arc::new(Mutex::new(HashMap::new()));
        let next_pipe = Arc::new(AtomicU64::new(1));
        let closed = Arc::new(AtomicBool::new(false));

        let mut bound = Vec::with_capacity(endpoints.len());
        let mut guards = Vec::new();
        let mut listeners = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let (listener, guard) = Listener::bind(endpoint)?;
            bound.push(listener.local_endpoint(endpoint));
            guards.extend(guard);
            listeners.push(listener);
        }

        for (listener, endpoint) in listeners.into_iter().zip(bound.iter().cloned()) {
            let acceptor = Acceptor {
                listener,
                endpoint,
                tx: tx.clone(),
                pipes: Arc::clone(&pipes),
                next_pipe: Arc::clone(&next_pipe),
                closed: Arc::clone(&closed),
                config: config.clone(),
            };
            std::thread::Builder::new()
                .name(format!("nndab-accept-{}", acceptor.endpoint))
                .spawn(move || acceptor.run())?;
        }

        Ok(Self {
            incoming: rx,
            pipes,
            pending: None,
            endpoints: bound,
            recv_timeout: config.recv_timeout,
            send_timeout: config.send_timeout,
            closed,
            _guards: guards,
        })
    }

    /// Endpoints actually bound, ephemeral TCP ports resolved.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        lock(&self.pipes).len()
    }

    /// Wait for the next request payload.
    ///
    /// Returns `Ok(None)` when the configured receive timeout elapses first.
    /// A request still awaiting its reply is abandoned, as on any REP socket.
    pub fn recv(&mut self) -> Result<Option<Bytes>> {
        let incoming = match self.recv_timeout {
            Some(timeout) => match self.incoming.recv_timeout(timeout) {
                Ok(incoming) => incoming,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(SpError::Closed),
            },
            None => self.incoming.recv().map_err(|_| SpError::Closed)?,
        };

        if let Some(abandoned) = self.pending.take() {
            debug!(pipe = abandoned.pipe, "abandoning unanswered request");
            self.release(abandoned.pipe);
        }
        self.pending = Some(Pending {
            pipe: incoming.pipe,
            backtrace: incoming.backtrace,
        });
        Ok(Some(incoming.payload))
    }

    /// Reply to the request returned by the last [`recv`](Self::recv).
    ///
    /// Returns `Err(SpError::Disconnected)` if the requesting peer has gone
    /// away; the reply is dropped in that case. A write that fails or exceeds
    /// the send timeout drops the peer.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let pending = self.pending.take().ok_or(SpError::NoPendingRequest)?;
        let stream = match lock(&self.pipes).get(&pending.pipe) {
            Some(peer) => Arc::clone(&peer.stream),
            None => {
                debug!(pipe = pending.pipe, "requesting peer gone; dropping reply");
                return Err(SpError::Disconnected);
            }
        };

        let transport = stream.transport();
        let mut writer: &SpStream = &stream;
        let written = write_message(&mut writer, transport, &[&pending.backtrace[..], payload]);
        if let Err(err) = written {
            let err = match (err, self.send_timeout) {
                (SpError::Io(io), Some(timeout))
                    if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    SpError::Timeout(timeout)
                }
                (err, _) => err,
            };
            warn!(pipe = pending.pipe, error = %err, "reply write failed; dropping peer");
            lock(&self.pipes).remove(&pending.pipe);
            stream.shutdown();
            return Err(err);
        }

        self.release(pending.pipe);
        Ok(())
    }

    /// Let `pipe` forward its next request.
    fn release(&self, pipe: PipeId) {
        if let Some(peer) = lock(&self.pipes).get(&pipe) {
            let _ = peer.ready.try_send(());
        }
    }
}

impl Drop for ReplySocket {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        for endpoint in &self.endpoints {
            wake_acceptor(endpoint);
        }
        for (_, peer) in lock(&self.pipes).drain() {
            peer.stream.shutdown();
        }
        debug!(endpoints = self.endpoints.len(), "rep socket closed");
    }
}

/// Connect to our own listener so its blocked `accept` returns.
fn wake_acceptor(endpoint: &Endpoint) {
    match endpoint {
        #[cfg(unix)]
        Endpoint::Ipc(path) => {
            let _ = std::os::unix::net::UnixStream::connect(path);
        }
        #[cfg(not(unix))]
        Endpoint::Ipc(_) => {}
        Endpoint::Tcp(addr) => {
            if let Ok(addr) = addr.parse::<SocketAddr>() {
                let _ = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT);
            }
        }
    }
}

impl std::fmt::Debug for ReplySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplySocket")
            .field("endpoints", &self.endpoints)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

/// Split a REQ body into its backtrace and payload.
///
/// The backtrace ends with the first word whose top bit is set.
pub fn split_backtrace(body: &Bytes) -> Result<(Bytes, Bytes)> {
    for hop in 0..MAX_HOPS {
        let end = (hop + 1) * 4;
        let Some(word) = body.get(end - 4..end) else {
            return Err(SpError::Malformed("request without request id"));
        };
        if word[0] & 0x80 != 0 {
            return Ok((body.slice(..end), body.slice(end..)));
        }
    }
    Err(SpError::Malformed("backtrace exceeds hop limit"))
}

fn lock(pipes: &Pipes) -> MutexGuard<'_, HashMap<PipeId, Peer>> {
    // the map holds no invariants a panicking holder could break
    pipes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Acceptor {
    listener: Listener,
    endpoint: Endpoint,
    tx: Sender<Incoming>,
    pipes: Pipes,
    next_pipe: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    config: SocketConfig,
}

impl Acceptor {
    fn run(self) {
        loop {
            let accepted = self.listener.accept();
            if self.closed.load(Ordering::SeqCst) {
                debug!(endpoint = %self.endpoint, "acceptor stopped");
                return;
            }
            let stream = match accepted {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(endpoint = %self.endpoint, error = %err, "accept failed");
                    std::thread::sleep(Duration::from_millis(100));
                    continue;
                }
            };

            let pipe = self.next_pipe.fetch_add(1, Ordering::Relaxed);
            let connection = Connection {
                pipe,
                stream,
                tx: self.tx.clone(),
                pipes: Arc::clone(&self.pipes),
                config: self.config.clone(),
            };
            let spawned = std::thread::Builder::new()
                .name(format!("nndab-pipe-{pipe}"))
                .spawn(move || connection.run());
            if let Err(err) = spawned {
                warn!(pipe, error = %err, "failed to spawn connection thread");
            }
        }
    }
}

struct Connection {
    pipe: PipeId,
    stream: SpStream,
    tx: Sender<Incoming>,
    pipes: Pipes,
    config: SocketConfig,
}

impl Connection {
    fn run(mut self) {
        if let Err(err) = handshake(&mut self.stream, PROTO_REP, self.config.handshake_timeout) {
            warn!(pipe = self.pipe, error = %err, "rejecting peer");
            self.stream.shutdown();
            return;
        }

        let writer = match self.stream.try_clone() {
            Ok(writer) => writer,
            Err(err) => {
                warn!(pipe = self.pipe, error = %err, "failed to clone peer stream");
                return;
            }
        };
        if let Err(err) = writer.set_write_timeout(self.config.send_timeout) {
            warn!(pipe = self.pipe, error = %err, "failed to set send timeout");
            self.stream.shutdown();
            return;
        }
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        lock(&self.pipes).insert(
            self.pipe,
            Peer {
                stream: Arc::new(writer),
                ready: ready_tx,
            },
        );
        info!(pipe = self.pipe, transport = ?self.stream.transport(), "peer connected");

        let result = self.pump(&ready_rx);
        if let Some(peer) = lock(&self.pipes).remove(&self.pipe) {
            peer.stream.shutdown();
        }
        match result {
            Err(SpError::Disconnected) => info!(pipe = self.pipe, "peer disconnected"),
            Err(err) => warn!(pipe = self.pipe, error = %err, "dropping peer"),
            Ok(()) => {}
        }
    }

    fn pump(&mut self, ready: &Receiver<()>) -> Result<()> {
        let transport = self.stream.transport();
        let mut outstanding = false;
        loop {
            let body = read_message(&mut self.stream, transport, self.config.max_message_size)?;
            let (backtrace, payload) = match split_backtrace(&body) {
                Ok(parts) => parts,
                Err(err) => {
                    warn!(pipe = self.pipe, size = body.len(), error = %err, "ignoring request");
                    continue;
                }
            };
            debug!(pipe = self.pipe, size = payload.len(), "request received");

            // hold this one back until the previous reply is written
            if outstanding && ready.recv().is_err() {
                return Ok(());
            }

            let incoming = Incoming {
                pipe: self.pipe,
                backtrace,
                payload,
            };
            if self.tx.send(incoming).is_err() {
                // socket dropped
                return Ok(());
            }
            outstanding = true;
        }
    }
}
