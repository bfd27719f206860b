use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: a single little-endian `u32` total length.
pub const HEADER_SIZE: usize = 4;

/// Default maximum frame size (header included): 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A fully reassembled frame.
///
/// Holds the complete wire image, header included. The payload is a view into
/// the same buffer, never a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Wrap a complete wire image. Caller guarantees the header matches `bytes.len()`.
    pub(crate) fn from_wire(bytes: Bytes) -> Self {
        debug_assert!(bytes.len() >= HEADER_SIZE);
        Self { bytes }
    }

    /// Build a frame around `payload`, prepending the length header.
    pub fn encode(payload: &[u8]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        encode_frame(payload, &mut buf)?;
        Ok(Self::from_wire(buf.freeze()))
    }

    /// The original bytes, length header and all.
    pub fn original(&self) -> &Bytes {
        &self.bytes
    }

    /// The payload with the length header stripped.
    pub fn payload(&self) -> Bytes {
        self.bytes.slice(HEADER_SIZE..)
    }

    /// The `totalLength` value carried in the header.
    pub fn total_length(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Total wire size (header + payload).
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the frame carries no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == HEADER_SIZE
    }

    /// Consume the frame and return the wire image.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────┬────────────────────────────┐
/// │ totalLength (4B LE)  │ Payload                    │
/// │ = 4 + payload length │ (totalLength - 4 bytes)    │
/// └──────────────────────┴────────────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let max = u32::MAX as usize - HEADER_SIZE;
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le((HEADER_SIZE + payload.len()) as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Configuration for frame reassembly and I/O.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame size in bytes, header included. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[0x09, 0x00, 0x00, 0x00, b'h', b'e', b'l', b'l', b'o']
        );
    }

    #[test]
    fn test_length_counts_header() {
        let frame = Frame::encode(b"abc").unwrap();
        assert_eq!(frame.total_length(), 7);
        assert_eq!(frame.len(), HEADER_SIZE + 3);
        assert_eq!(&frame.original()[..4], &7u32.to_le_bytes());
    }

    #[test]
    fn test_payload_is_view_of_original() {
        let frame = Frame::encode(b"payload").unwrap();
        let payload = frame.payload();

        assert_eq!(payload.as_ref(), b"payload");
        assert_eq!(payload.as_ptr(), frame.original()[HEADER_SIZE..].as_ptr());
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::encode(b"").unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.total_length(), 4);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_multiple_frames_concatenate() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        assert_eq!(buf.len(), 2 * HEADER_SIZE + 5 + 6);
        assert_eq!(&buf[9..13], &10u32.to_le_bytes());
    }

    #[test]
    fn test_into_bytes_returns_wire_image() {
        let frame = Frame::encode(b"x").unwrap();
        let wire = frame.clone().into_bytes();
        assert_eq!(wire, *frame.original());
    }
}
