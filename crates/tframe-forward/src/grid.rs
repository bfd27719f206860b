//! Reference payload codec for grid-shaped requests.
//!
//! JSON requests are objects with numeric `rows` and `columns` fields and an
//! optional `clientId`; any other fields are carried through re-encoding
//! untouched. Binary requests start with `rows` and `columns` as
//! little-endian `u32`s followed by an opaque body.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{Dimensions, MessageCodec};
use crate::error::CodecError;

/// Fixed header of a binary grid request: rows (4) + columns (4).
pub const BINARY_HEADER_SIZE: usize = 8;

/// A decoded JSON grid request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRequest {
    pub rows: u32,
    pub columns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GridRequest {
    pub fn new(rows: u32, columns: u32) -> Self {
        Self {
            rows,
            columns,
            client_id: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_client_id(mut self, client_id: u64) -> Self {
        self.client_id = Some(client_id);
        self
    }
}

/// [`MessageCodec`] for [`GridRequest`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridCodec;

impl GridCodec {
    /// Build a binary grid payload.
    pub fn encode_binary(rows: u32, columns: u32, body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(BINARY_HEADER_SIZE + body.len());
        buf.put_u32_le(rows);
        buf.put_u32_le(columns);
        buf.put_slice(body);
        buf.freeze()
    }
}

impl MessageCodec for GridCodec {
    type Message = GridRequest;

    fn is_json(&self, payload: &[u8]) -> bool {
        payload
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'{')
    }

    fn decode(&self, payload: &[u8]) -> Result<GridRequest, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }

    fn encode(&self, message: &GridRequest) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(message)?))
    }

    fn dimensions(&self, message: &GridRequest) -> Dimensions {
        Dimensions::new(message.rows, message.columns)
    }

    fn binary_dimensions(&self, payload: &[u8]) -> Result<Dimensions, CodecError> {
        if payload.len() < BINARY_HEADER_SIZE {
            return Err(CodecError::Truncated {
                len: payload.len(),
                min: BINARY_HEADER_SIZE,
            });
        }
        let mut header = &payload[..BINARY_HEADER_SIZE];
        let rows = header.get_u32_le();
        let columns = header.get_u32_le();
        Ok(Dimensions::new(rows, columns))
    }

    fn client_id(&self, message: &GridRequest) -> Option<u64> {
        message.client_id
    }
}
