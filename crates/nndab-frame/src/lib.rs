//! Length-prefixed framing for the DAB module bus.
//!
//! Every packet on the bus is a 2-byte big-endian payload length followed by
//! the payload. The device only removes a packet from its queue once the
//! header *and* the payload are read in one transfer, so reading is a two-step
//! affair: peek the header, then consume header + payload together.
//!
//! No allocation happens on the read path. Frames are views into a
//! caller-owned [`ScratchBuffer`].

pub mod codec;
pub mod error;
pub mod flush;
pub mod hex;
pub mod reader;
pub mod scratch;
pub mod writer;

pub use codec::{
    encode_frame, Frame, DEFAULT_FRAME_CAPACITY, DEFAULT_MAX_PAYLOAD, DEFAULT_RESPONSE_CAPACITY,
    HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use flush::{FlushReport, Flusher, DEFAULT_FLUSH_LIMIT, MIN_FLUSH_CAPACITY};
pub use hex::HexBytes;
pub use reader::FrameReader;
pub use scratch::ScratchBuffer;
pub use writer::FrameWriter;
