/// Errors that can occur during frame encoding and reassembly.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The decoded length is smaller than the header it is part of.
    #[error("frame length {length} is below the {min}-byte header size")]
    LengthBelowHeader { length: u32, min: usize },

    /// The decoded length exceeds the configured maximum frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The payload cannot be encoded because the total length overflows the header.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream ended in the middle of a frame.
    #[error("stream truncated mid-frame ({received} of {expected} bytes received)")]
    Truncated { expected: usize, received: usize },

    /// The stream was closed; no further chunks are accepted.
    #[error("frame stream closed")]
    Closed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True when the peer sent a length header that can never be valid.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FrameError::LengthBelowHeader { .. } | FrameError::FrameTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
