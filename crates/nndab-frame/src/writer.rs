use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::codec::{encode_frame, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::hex::HexBytes;

/// Writes frames to a bus handle, one device transfer per frame.
///
/// A bus transfer cannot be resumed, so a short write is an error rather than
/// something to loop on.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    max_payload: usize,
}

impl<T: Write> FrameWriter<T> {
    /// Create a writer accepting payloads up to [`DEFAULT_MAX_PAYLOAD`].
    pub fn new(inner: T) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD)
    }

    /// Create a writer with an explicit payload limit.
    pub fn with_max_payload(inner: T, max_payload: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(max_payload.min(usize::from(u16::MAX)) + HEADER_SIZE),
            max_payload,
        }
    }

    /// Frame `payload` and write it in a single transfer.
    ///
    /// Returns the wire size on success.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<usize> {
        self.buf.clear();
        encode_frame(payload, self.max_payload, &mut self.buf)?;

        let expected = self.buf.len();
        debug!(size = expected, bytes = %HexBytes(&self.buf), "writing frame");

        let written = loop {
            match self.inner.write(&self.buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };

        if written != expected {
            warn!(expected, written, "short bus write");
            return Err(FrameError::ShortWrite { expected, written });
        }

        self.flush()?;
        Ok(written)
    }

    /// Flush the underlying handle.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}
