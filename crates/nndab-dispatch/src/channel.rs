use bytes::Bytes;
use nndab_sp::{ReplySocket, SpError};

/// The network side of the bridge: a strictly alternating request/reply queue.
///
/// Every `Some` returned by [`recv`](Self::recv) is answered by exactly one
/// [`send`](Self::send).
pub trait MessageChannel {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Wait for the next request. `Ok(None)` means nothing arrived in time and
    /// the caller may check for shutdown before waiting again.
    fn recv(&mut self) -> Result<Option<Bytes>, Self::Error>;

    /// Reply to the request returned by the last `recv`.
    fn send(&mut self, payload: &[u8]) -> Result<(), Self::Error>;
}

impl MessageChannel for ReplySocket {
    type Error = SpError;

    fn recv(&mut self) -> Result<Option<Bytes>, SpError> {
        ReplySocket::recv(self)
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), SpError> {
        ReplySocket::send(self, payload)
    }
}
