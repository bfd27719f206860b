use bytes::Bytes;

use crate::error::CodecError;

/// The two declared dimensions of a message. Their product is the
/// workload volume tallied by the metrics window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub rows: u32,
    pub columns: u32,
}

impl Dimensions {
    pub fn new(rows: u32, columns: u32) -> Self {
        Self { rows, columns }
    }

    /// `rows × columns`. Cannot overflow: both factors are 32-bit.
    pub fn volume(self) -> u64 {
        u64::from(self.rows) * u64::from(self.columns)
    }
}

/// Payload codec collaborator for the forwarding stage.
///
/// Every method receives the payload with the length header already
/// stripped. `is_json` must be pure: it is called exactly once per frame.
pub trait MessageCodec {
    /// Structured form of a JSON-encoded message.
    type Message;

    /// Classify a payload as JSON-encoded (`true`) or binary-encoded (`false`).
    fn is_json(&self, payload: &[u8]) -> bool;

    /// Decode a JSON payload.
    fn decode(&self, payload: &[u8]) -> Result<Self::Message, CodecError>;

    /// Re-encode a decoded message for forwarding.
    fn encode(&self, message: &Self::Message) -> Result<Bytes, CodecError>;

    /// Declared dimensions of a decoded message.
    fn dimensions(&self, message: &Self::Message) -> Dimensions;

    /// Declared dimensions of a binary payload, read without a full decode.
    fn binary_dimensions(&self, payload: &[u8]) -> Result<Dimensions, CodecError>;

    /// Client identifier carried by a decoded message, if any.
    fn client_id(&self, _message: &Self::Message) -> Option<u64> {
        None
    }
}
