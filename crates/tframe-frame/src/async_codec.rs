//! `tokio_util::codec` adapter over the [`Reassembler`].
//!
//! Each buffer handed to [`Decoder::decode`] is taken whole and frozen into a
//! chunk, so the async path gets the same zero-copy and single-allocation
//! behavior as the blocking reader.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::reassembler::Reassembler;

/// Length-prefixed frame codec for `FramedRead` / `FramedWrite`.
#[derive(Debug, Default)]
pub struct FrameCodec {
    reassembler: Reassembler,
    ready: VecDeque<Frame>,
}

impl FrameCodec {
    /// Create a codec accepting frames up to `max_frame_size` bytes.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            reassembler: Reassembler::new(max_frame_size),
            ready: VecDeque::new(),
        }
    }

    /// Create a codec from a frame configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self::new(config.max_frame_size)
    }

    /// Abort the stream, dropping any partially assembled frame.
    pub fn close(&mut self) {
        self.ready.clear();
        self.reassembler.close();
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.ready.pop_front() {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let chunk = src.split().freeze();
        let ready = &mut self.ready;
        self.reassembler
            .feed_with(chunk, |frame| ready.push_back(frame))?;
        Ok(self.ready.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.reassembler.finish()?;
        Ok(None)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let max = self.reassembler.max_frame_size();
        if frame.len() > max {
            return Err(FrameError::FrameTooLarge {
                size: frame.len(),
                max,
            });
        }
        dst.extend_from_slice(frame.original());
        Ok(())
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        let max = self.reassembler.max_frame_size();
        if HEADER_SIZE + payload.len() > max {
            return Err(FrameError::FrameTooLarge {
                size: HEADER_SIZE + payload.len(),
                max,
            });
        }
        encode_frame(&payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[tokio::test]
    async fn framed_read_yields_every_frame() {
        let bytes = wire(&[b"one", b"two", b"three"]);
        let mut framed = FramedRead::new(bytes.as_slice(), FrameCodec::default());

        let mut seen = Vec::new();
        while let Some(frame) = framed.next().await {
            seen.push(frame.unwrap().payload());
        }

        assert_eq!(seen, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn framed_read_reassembles_split_writes() {
        let bytes = wire(&[b"split across writes", b"second"]);
        let (client, server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            let mut client = client;
            for piece in bytes.chunks(3) {
                client.write_all(piece).await.unwrap();
                client.flush().await.unwrap();
            }
        });

        let mut framed = FramedRead::new(server, FrameCodec::default());
        let first = framed.next().await.unwrap().unwrap();
        let second = framed.next().await.unwrap().unwrap();
        writer.await.unwrap();

        assert_eq!(first.payload(), "split across writes");
        assert_eq!(second.payload(), "second");
        assert!(framed.next().await.is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_truncation() {
        let mut bytes = wire(&[b"cut short"]);
        bytes.truncate(6);
        let mut framed = FramedRead::new(bytes.as_slice(), FrameCodec::default());

        let err = framed.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Truncated { expected: 13, received: 6 }));
    }

    #[tokio::test]
    async fn undersized_header_is_protocol_violation() {
        let bytes = vec![0x01, 0x00, 0x00, 0x00];
        let mut framed = FramedRead::new(bytes.as_slice(), FrameCodec::default());

        let err = framed.next().await.unwrap().unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn framed_write_encodes_payloads_and_frames() {
        let mut framed = FramedWrite::new(Vec::new(), FrameCodec::default());

        framed.send(Bytes::from_static(b"payload")).await.unwrap();
        framed.send(Frame::encode(b"frame").unwrap()).await.unwrap();

        assert_eq!(framed.get_ref().as_slice(), wire(&[b"payload", b"frame"]).as_slice());
    }

    #[test]
    fn encoder_rejects_oversized_payload() {
        let mut codec = FrameCodec::new(8);
        let mut dst = BytesMut::new();
        let err = Encoder::<Bytes>::encode(&mut codec, Bytes::from_static(b"too long"), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 12, max: 8 }));
    }

    #[test]
    fn close_rejects_further_input() {
        let mut codec = FrameCodec::default();
        let mut src = BytesMut::from(&wire(&[b"abc"])[..5]);
        assert!(codec.decode(&mut src).unwrap().is_none());

        codec.close();

        let mut more = BytesMut::from(&b"bc"[..]);
        assert!(matches!(codec.decode(&mut more), Err(FrameError::Closed)));
    }
}
