use std::io::{ErrorKind, Read};

use tracing::{debug, trace, warn};

use crate::codec::{Frame, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::hex::HexBytes;
use crate::scratch::ScratchBuffer;

/// Reads peek-then-consume frames from a bus handle.
///
/// Each [`read_frame`](Self::read_frame) issues exactly two device reads when
/// a frame is queued (header peek, then header + payload) and one when the
/// queue is empty.
pub struct FrameReader<T> {
    inner: T,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Read the next frame into `buffer`.
    ///
    /// Returns `Err(FrameError::NoData)` when the device reports an empty
    /// queue. On success the buffer view has been advanced past the header
    /// and the returned frame borrows the payload from it.
    ///
    /// A frame larger than the buffer's remaining view is still read (clamped
    /// to the view) so the device gets serviced, then reported as
    /// `FrameError::BufferTooSmall`.
    pub fn read_frame<'b>(&mut self, buffer: &'b mut ScratchBuffer) -> Result<Frame<'b>> {
        let mut header = [0u8; HEADER_SIZE];
        let peeked = self.read_once(&mut header)?;
        if peeked != HEADER_SIZE {
            warn!(read = peeked, bytes = %HexBytes(&header[..peeked]), "short header read");
            return Err(FrameError::ShortHeader { read: peeked });
        }

        let declared = u16::from_be_bytes(header);
        if declared == 0 {
            trace!("device queue empty");
            return Err(FrameError::NoData);
        }

        let wanted = usize::from(declared) + HEADER_SIZE;
        let available = buffer.remaining();
        let to_read = wanted.min(available);
        if to_read < wanted {
            warn!(declared, available, "frame exceeds scratch buffer, clamping read");
        }

        let block = &mut buffer.as_mut_slice()[..to_read];
        let read = self.read_once(block)?;
        debug!(
            declared,
            to_read,
            read,
            bytes = %HexBytes(&block[..read.min(to_read)]),
            "consuming read"
        );
        if read != to_read {
            warn!(expected = to_read, read, "short payload read");
            return Err(FrameError::ShortPayload {
                expected: to_read,
                read,
            });
        }

        if to_read >= HEADER_SIZE {
            let consumed = u16::from_be_bytes([block[0], block[1]]);
            if consumed != declared {
                warn!(
                    peeked = declared,
                    consumed,
                    bytes = %HexBytes(block),
                    "length header mismatch"
                );
                return Err(FrameError::LengthMismatch {
                    peeked: declared,
                    consumed,
                });
            }
        }

        if to_read < wanted {
            return Err(FrameError::BufferTooSmall {
                declared,
                available,
            });
        }

        buffer.advance(HEADER_SIZE);
        let view: &'b ScratchBuffer = buffer;
        Ok(Frame::new(&view.as_slice()[..usize::from(declared)]))
    }

    fn read_once(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}
