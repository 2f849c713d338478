/// Errors that can occur while moving frames over the bus.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The device reported a zero length header: nothing is queued.
    #[error("no frame queued")]
    NoData,

    /// The header peek returned fewer than 2 bytes.
    #[error("short header read ({read} of 2 bytes)")]
    ShortHeader { read: usize },

    /// The consuming read returned a different byte count than requested.
    #[error("short payload read ({read} of {expected} bytes)")]
    ShortPayload { expected: usize, read: usize },

    /// The peeked header and the consumed header disagree.
    #[error("length header mismatch (peeked {peeked}, consumed {consumed})")]
    LengthMismatch { peeked: u16, consumed: u16 },

    /// The declared frame does not fit the scratch buffer. The read was
    /// clamped to the available space and its bytes discarded.
    #[error("frame of {declared} bytes exceeds scratch buffer ({available} bytes available)")]
    BufferTooSmall { declared: u16, available: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The bus accepted fewer bytes than the frame holds.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { expected: usize, written: usize },

    /// The bus handle failed outright.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether this is the "nothing queued" outcome rather than a failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self, FrameError::NoData)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
