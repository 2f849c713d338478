use std::path::PathBuf;

/// Errors that can occur on SP sockets.
#[derive(Debug, thiserror::Error)]
pub enum SpError {
    /// The endpoint string could not be parsed.
    #[error("invalid endpoint {0:?} (expected ipc://PATH or tcp://HOST:PORT)")]
    InvalidEndpoint(String),

    /// Failed to bind to the specified endpoint.
    #[error("failed to bind to {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The peer sent a bad protocol header or speaks the wrong protocol.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// An inbound message exceeded the configured size limit.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: u64, max: usize },

    /// A message violated the SP framing or backtrace rules.
    #[error("malformed message: {0}")]
    Malformed(&'static str),

    /// The peer closed the connection.
    #[error("peer disconnected")]
    Disconnected,

    /// `send` was called with no request awaiting a reply.
    #[error("no request awaiting a reply")]
    NoPendingRequest,

    /// The socket's request queue was closed.
    #[error("socket closed")]
    Closed,

    /// Operation timed out.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// An I/O error occurred on a connection.
    #[error("sp I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpError>;
