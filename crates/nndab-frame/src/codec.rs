use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: big-endian payload length (2).
pub const HEADER_SIZE: usize = 2;

/// Room reserved for one outbound request frame.
pub const DEFAULT_FRAME_CAPACITY: usize = 2048;

/// Largest request payload that fits [`DEFAULT_FRAME_CAPACITY`].
pub const DEFAULT_MAX_PAYLOAD: usize = DEFAULT_FRAME_CAPACITY - HEADER_SIZE;

/// Scratch space for one inbound response frame. Responses larger than this
/// cannot be drained from the device queue.
pub const DEFAULT_RESPONSE_CAPACITY: usize = 4096;

/// A frame read off the bus, borrowed from the scratch buffer it landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub(crate) fn new(payload: &'a [u8]) -> Self {
        Self { payload }
    }

    /// The frame payload, header excluded.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Copy the payload out of the scratch buffer.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.payload)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Length       │ Payload          │
/// │ (2B BE)      │ (Length bytes)   │
/// └──────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], max_payload: usize, dst: &mut BytesMut) -> Result<()> {
    let max = max_payload.min(usize::from(u16::MAX));
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}
