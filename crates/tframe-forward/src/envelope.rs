use bytes::Bytes;
use tframe_frame::{Frame, FrameError};

use crate::codec::Dimensions;
use crate::metrics::Encoding;

/// One forwarded message, produced for every frame the stage accepts.
///
/// `parsed` and `client_id` are filled for JSON messages only. `forward` holds
/// the payload to send downstream: the re-encoded message for JSON, the
/// untouched payload for binary.
#[derive(Debug, Clone)]
pub struct MessageEnvelope<M> {
    /// Wire image, length header included.
    pub original: Bytes,
    /// Payload with the header stripped. Shares memory with `original`.
    pub unparsed: Bytes,
    pub is_json: bool,
    pub parsed: Option<M>,
    pub client_id: Option<u64>,
    pub dimensions: Dimensions,
    pub forward: Bytes,
}

impl<M> MessageEnvelope<M> {
    pub(crate) fn binary(frame: &Frame, dimensions: Dimensions) -> Self {
        let unparsed = frame.payload();
        Self {
            original: frame.original().clone(),
            forward: unparsed.clone(),
            unparsed,
            is_json: false,
            parsed: None,
            client_id: None,
            dimensions,
        }
    }

    pub(crate) fn json(
        frame: &Frame,
        parsed: M,
        client_id: Option<u64>,
        dimensions: Dimensions,
        forward: Bytes,
    ) -> Self {
        Self {
            original: frame.original().clone(),
            unparsed: frame.payload(),
            is_json: true,
            parsed: Some(parsed),
            client_id,
            dimensions,
            forward,
        }
    }

    pub fn encoding(&self) -> Encoding {
        if self.is_json {
            Encoding::Json
        } else {
            Encoding::Binary
        }
    }

    /// Workload volume of this message.
    pub fn volume(&self) -> u64 {
        self.dimensions.volume()
    }

    /// `forward` framed for the wire.
    ///
    /// Binary messages reuse the original wire image without copying.
    pub fn to_wire(&self) -> Result<Bytes, FrameError> {
        if !self.is_json {
            return Ok(self.original.clone());
        }
        Ok(Frame::encode(&self.forward)?.into_bytes())
    }
}
