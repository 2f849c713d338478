use std::time::Duration;

use nndab_frame::FrameError;

pub const DIAG_MESSAGE_TOO_LARGE: &str = "error 9d4c02f1a7e3 message too large";
pub const DIAG_WRITE_FAILED: &str = "error 676b897e8412 could not write request to bus";
pub const DIAG_SHORT_HEADER: &str = "error ac564230315f short header read";
pub const DIAG_SHORT_PAYLOAD: &str = "error b398993f07ab short payload read";
pub const DIAG_LENGTH_MISMATCH: &str = "error 1175a1c05466 length header mismatch";
pub const DIAG_BUFFER_TOO_SMALL: &str = "error 5e61b0c4d2a8 response exceeds buffer";
pub const DIAG_READ_FAILED: &str = "error e0f172e4bf58 could not read dab packet";
pub const DIAG_TIMEOUT: &str = "error 3e923fcac076 timed out waiting for dab packet";

const DIAGNOSTICS: [&str; 8] = [
    DIAG_MESSAGE_TOO_LARGE,
    DIAG_WRITE_FAILED,
    DIAG_SHORT_HEADER,
    DIAG_SHORT_PAYLOAD,
    DIAG_LENGTH_MISMATCH,
    DIAG_BUFFER_TOO_SMALL,
    DIAG_READ_FAILED,
    DIAG_TIMEOUT,
];

/// Whether a reply payload is one of the bridge's own diagnostics rather than
/// a device response.
pub fn is_diagnostic(payload: &[u8]) -> bool {
    DIAGNOSTICS.iter().any(|diag| diag.as_bytes() == payload)
}

/// Why a transaction produced no response.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request does not fit one bus frame. Nothing was sent to the device.
    #[error("request of {size} bytes exceeds maximum payload of {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Writing the request frame failed or was cut short.
    #[error("could not write request to bus: {0}")]
    Write(#[source] FrameError),

    /// Reading the response frame failed.
    #[error("could not read response: {0}")]
    Read(#[source] FrameError),

    /// The device never produced a response within the retry policy.
    #[error("no response after {polls} polls ({elapsed:?})")]
    Timeout { polls: usize, elapsed: Duration },
}

impl DispatchError {
    /// The ASCII payload sent to the requester in place of a response.
    pub fn diagnostic(&self) -> &'static str {
        match self {
            DispatchError::MessageTooLarge { .. } => DIAG_MESSAGE_TOO_LARGE,
            DispatchError::Write(_) => DIAG_WRITE_FAILED,
            DispatchError::Read(err) => match err {
                FrameError::ShortHeader { .. } => DIAG_SHORT_HEADER,
                FrameError::ShortPayload { .. } => DIAG_SHORT_PAYLOAD,
                FrameError::LengthMismatch { .. } => DIAG_LENGTH_MISMATCH,
                FrameError::BufferTooSmall { .. } => DIAG_BUFFER_TOO_SMALL,
                _ => DIAG_READ_FAILED,
            },
            DispatchError::Timeout { .. } => DIAG_TIMEOUT,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
