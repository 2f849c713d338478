use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::debug;

use crate::codec::{read_message, write_message, DEFAULT_MAX_MESSAGE_SIZE, PROTO_REQ};
use crate::endpoint::Endpoint;
use crate::error::{Result, SpError};
use crate::handshake::handshake;
use crate::stream::SpStream;

const REQUEST_ID_FLAG: u32 = 0x8000_0000;

/// A REQ socket connected to a single endpoint.
///
/// Used by the `send` command and by tests; the bridge itself only answers.
pub struct RequestSocket {
    stream: SpStream,
    endpoint: Endpoint,
    next_id: u32,
    max_message_size: usize,
    timeout: Option<Duration>,
}

impl RequestSocket {
    /// Connect and complete the SP handshake.
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        Self::connect_with_timeout(endpoint, Duration::from_secs(5))
    }

    /// Connect, bounding the handshake by `handshake_timeout`.
    pub fn connect_with_timeout(endpoint: &Endpoint, handshake_timeout: Duration) -> Result<Self> {
        let connect_err = |source: std::io::Error| SpError::Connect {
            endpoint: endpoint.to_string(),
            source,
        };

        let mut stream = match endpoint {
            #[cfg(unix)]
            Endpoint::Ipc(path) => {
                SpStream::from_unix(std::os::unix::net::UnixStream::connect(path).map_err(connect_err)?)
            }
            #[cfg(not(unix))]
            Endpoint::Ipc(_) => {
                return Err(connect_err(std::io::Error::new(
                    ErrorKind::Unsupported,
                    "ipc endpoints require Unix domain sockets",
                )))
            }
            Endpoint::Tcp(addr) => {
                SpStream::from_tcp(TcpStream::connect(addr.as_str()).map_err(connect_err)?)
            }
        };
        handshake(&mut stream, PROTO_REQ, handshake_timeout)?;
        debug!(%endpoint, "connected req socket");

        Ok(Self {
            stream,
            endpoint: endpoint.clone(),
            next_id: initial_request_id(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            timeout: None,
        })
    }

    /// Bound each [`request`](Self::request) by `timeout` (`None` waits forever).
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    /// The endpoint this socket is connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send one request and wait for its reply.
    ///
    /// Replies carrying a different request id (answers to earlier, abandoned
    /// requests) are skipped.
    pub fn request(&mut self, payload: &[u8]) -> Result<Bytes> {
        let id = (self.next_id | REQUEST_ID_FLAG).to_be_bytes();
        self.next_id = self.next_id.wrapping_add(1) & !REQUEST_ID_FLAG;

        let transport = self.stream.transport();
        write_message(&mut self.stream, transport, &[&id[..], payload])?;

        loop {
            let body = read_message(&mut self.stream, transport, self.max_message_size)
                .map_err(|err| self.map_timeout(err))?;
            if body.len() < id.len() {
                return Err(SpError::Malformed("reply shorter than request id"));
            }
            if body[..id.len()] == id {
                return Ok(body.slice(id.len()..));
            }
            debug!(
                expected = u32::from_be_bytes(id),
                "skipping reply to an earlier request"
            );
        }
    }

    fn map_timeout(&self, err: SpError) -> SpError {
        match (err, self.timeout) {
            (SpError::Io(io), Some(timeout))
                if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                SpError::Timeout(timeout)
            }
            (err, _) => err,
        }
    }
}

impl std::fmt::Debug for RequestSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSocket")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn initial_request_id() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos ^ std::process::id()) & !REQUEST_ID_FLAG
}
