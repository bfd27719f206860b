use tframe_frame::FrameError;
use tframe_transport::TransportError;

use crate::metrics::Encoding;

/// Errors raised by a [`MessageCodec`](crate::MessageCodec) collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The JSON payload could not be parsed or serialized.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The binary payload is too short to carry its fixed header.
    #[error("binary payload too short ({len} bytes, need {min})")]
    Truncated { len: usize, min: usize },

    /// Any other codec-specific rejection.
    #[error("{0}")]
    Rejected(String),
}

/// Per-frame failures in the forwarding stage.
///
/// These never affect reassembly of later frames: the frame is dropped,
/// counted as rejected, and processing moves on.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The codec could not decode a frame of the given encoding.
    #[error("failed to decode {encoding} frame: {source}")]
    Decode {
        encoding: Encoding,
        source: CodecError,
    },

    /// The decoded message could not be re-encoded for forwarding.
    #[error("failed to re-encode message: {0}")]
    Encode(CodecError),
}

/// Connection-level failures. These end the stream.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reassembly failed: protocol violation, truncation, or closed stream.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Reading chunks from the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl PipelineError {
    /// True when the peer sent a header that can never be valid.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, PipelineError::Frame(err) if err.is_protocol_violation())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
