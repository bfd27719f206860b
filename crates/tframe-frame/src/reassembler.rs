//! Frame reassembly over an ordered sequence of byte chunks.
//!
//! Chunk boundaries are arbitrary: a header or body may straddle any number
//! of chunks, and one chunk may carry several frames back to back. The
//! engine keeps just enough state between chunks to pick up where it left off:
//!
//! - a partial header of at most 3 bytes when a chunk ends inside a header
//! - a pending assembly of chunk fragments when a chunk ends inside a body
//!
//! Fragments are `Bytes` handles into the chunks themselves. Nothing is copied
//! until the final chunk of a multi-chunk frame arrives, at which point the
//! frame is materialized into one buffer of exactly `totalLength` bytes.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{Frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Up to three header bytes held over from the end of a chunk.
#[derive(Debug, Default)]
struct PartialHeader {
    bytes: [u8; HEADER_SIZE],
    len: usize,
}

impl PartialHeader {
    fn from_slice(held: &[u8]) -> Self {
        let mut header = Self::default();
        header.bytes[..held.len()].copy_from_slice(held);
        header.len = held.len();
        header
    }

    /// Top up from the front of `chunk`; returns how many bytes were taken.
    fn fill_from(&mut self, chunk: &[u8]) -> usize {
        let take = (HEADER_SIZE - self.len).min(chunk.len());
        self.bytes[self.len..self.len + take].copy_from_slice(&chunk[..take]);
        self.len += take;
        take
    }

    fn is_complete(&self) -> bool {
        self.len == HEADER_SIZE
    }
}

/// An in-progress frame spanning more than one chunk.
#[derive(Debug)]
struct PendingAssembly {
    total_length: usize,
    accumulated: usize,
    fragments: Vec<Bytes>,
}

impl PendingAssembly {
    fn new(total_length: usize) -> Self {
        Self {
            total_length,
            accumulated: 0,
            fragments: Vec::new(),
        }
    }

    fn needed(&self) -> usize {
        self.total_length - self.accumulated
    }

    fn push(&mut self, fragment: Bytes) {
        self.accumulated += fragment.len();
        self.fragments.push(fragment);
    }

    /// Complete the frame with `chunk[start..end]`.
    fn finish(self, chunk: &Bytes, start: usize, end: usize) -> Frame {
        if self.fragments.is_empty() {
            return Frame::from_wire(chunk.slice(start..end));
        }

        let mut buf = BytesMut::with_capacity(self.total_length);
        for fragment in &self.fragments {
            buf.put_slice(fragment);
        }
        buf.put_slice(&chunk[start..end]);
        debug_assert_eq!(buf.len(), self.total_length);

        trace!(
            total_length = self.total_length,
            fragments = self.fragments.len() + 1,
            "materialized multi-chunk frame"
        );
        Frame::from_wire(buf.freeze())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Open,
    Failed,
    Closed,
}

/// Reconstructs length-prefixed frames from arbitrarily-sized chunks.
///
/// Chunks must be fed one at a time in arrival order. Each call emits every
/// frame the chunk completes, in order, before returning; the engine never
/// blocks waiting for more input.
///
/// A header whose length is below [`HEADER_SIZE`] or above the configured
/// maximum is a protocol violation. The engine then refuses every further
/// chunk with [`FrameError::Closed`].
#[derive(Debug)]
pub struct Reassembler {
    max_frame_size: usize,
    partial_header: Option<PartialHeader>,
    pending: Option<PendingAssembly>,
    status: Status,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Reassembler {
    /// Create an engine that accepts frames up to `max_frame_size` bytes, header included.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.max(HEADER_SIZE),
            partial_header: None,
            pending: None,
            status: Status::Open,
        }
    }

    /// Create an engine from a frame configuration.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self::new(config.max_frame_size)
    }

    /// Feed one chunk, calling `emit` for every frame it completes.
    ///
    /// Returns the number of frames emitted. On a protocol violation, frames
    /// completed earlier in the same chunk have already been emitted.
    pub fn feed_with<F>(&mut self, chunk: Bytes, mut emit: F) -> Result<usize>
    where
        F: FnMut(Frame),
    {
        if self.status != Status::Open {
            return Err(FrameError::Closed);
        }

        let mut cursor = 0usize;
        let mut emitted = 0usize;

        if let Some(mut partial) = self.partial_header.take() {
            cursor = partial.fill_from(&chunk);
            if !partial.is_complete() {
                self.partial_header = Some(partial);
                return Ok(0);
            }

            let total_length = self.validate_length(u32::from_le_bytes(partial.bytes))?;
            let header = Bytes::copy_from_slice(&partial.bytes);
            if total_length == HEADER_SIZE {
                emit(Frame::from_wire(header));
                emitted += 1;
            } else {
                let mut pending = PendingAssembly::new(total_length);
                pending.push(header);
                self.pending = Some(pending);
            }
        }

        while cursor < chunk.len() {
            let pending = match self.pending.take() {
                Some(pending) => pending,
                None => {
                    let remaining = &chunk[cursor..];
                    if remaining.len() < HEADER_SIZE {
                        self.partial_header = Some(PartialHeader::from_slice(remaining));
                        break;
                    }
                    let raw = u32::from_le_bytes([
                        remaining[0],
                        remaining[1],
                        remaining[2],
                        remaining[3],
                    ]);
                    PendingAssembly::new(self.validate_length(raw)?)
                }
            };

            let needed = pending.needed();
            let available = chunk.len() - cursor;

            if available < needed {
                let mut pending = pending;
                pending.push(chunk.slice(cursor..));
                self.pending = Some(pending);
                break;
            }

            let end = cursor + needed;
            emit(pending.finish(&chunk, cursor, end));
            emitted += 1;
            cursor = end;
        }

        Ok(emitted)
    }

    /// Feed one chunk and collect the frames it completes.
    pub fn feed(&mut self, chunk: Bytes) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        self.feed_with(chunk, |frame| frames.push(frame))?;
        Ok(frames)
    }

    /// Signal a clean end of stream.
    ///
    /// Fails with [`FrameError::Truncated`] when the stream stopped inside a
    /// header or body. Partial state is discarded either way and no further
    /// chunks are accepted.
    pub fn finish(&mut self) -> Result<()> {
        if self.status != Status::Open {
            return Ok(());
        }
        self.status = Status::Closed;

        if let Some(pending) = self.pending.take() {
            return Err(FrameError::Truncated {
                expected: pending.total_length,
                received: pending.accumulated,
            });
        }
        if let Some(partial) = self.partial_header.take() {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: partial.len,
            });
        }
        Ok(())
    }

    /// Abort the stream. Any frame still being assembled is dropped.
    pub fn close(&mut self) {
        let lost = self.buffered_len();
        if lost > 0 {
            debug!(lost_bytes = lost, "discarding partial frame on close");
        }
        self.pending = None;
        self.partial_header = None;
        self.status = Status::Closed;
    }

    /// True when no partial header or body is held between chunks.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.partial_header.is_none()
    }

    /// True once the engine has been closed, finished, or failed.
    pub fn is_closed(&self) -> bool {
        self.status != Status::Open
    }

    /// Bytes of the current incomplete frame received so far.
    pub fn buffered_len(&self) -> usize {
        match (&self.pending, &self.partial_header) {
            (Some(pending), _) => pending.accumulated,
            (None, Some(partial)) => partial.len,
            (None, None) => 0,
        }
    }

    /// Configured maximum frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Update the maximum frame size for frames whose header has not been read yet.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size.max(HEADER_SIZE);
    }

    fn validate_length(&mut self, raw: u32) -> Result<usize> {
        let length = raw as usize;
        let err = if length < HEADER_SIZE {
            FrameError::LengthBelowHeader {
                length: raw,
                min: HEADER_SIZE,
            }
        } else if length > self.max_frame_size {
            FrameError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            }
        } else {
            return Ok(length);
        };

        warn!(error = %err, "rejecting frame header");
        self.pending = None;
        self.partial_header = None;
        self.status = Status::Failed;
        Err(err)
    }
}
