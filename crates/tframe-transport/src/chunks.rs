use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// Default size of a single chunk read from a stream.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A source of byte chunks in arrival order.
///
/// Chunk sizes are whatever the underlying transport delivers and carry no
/// relation to any framing layered on top.
pub trait ChunkSource {
    /// Return the next chunk, or `Ok(None)` at end of stream.
    fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Adapts any `Read` into a [`ChunkSource`], one `read` call per chunk.
///
/// Returned chunks are frozen, reference-counted views that are never written
/// to again, so consumers may hold on to them without copying. The scratch
/// buffer's spare capacity is only recycled once every chunk split from it has
/// been dropped.
#[derive(Debug)]
pub struct ReadChunks<R> {
    inner: R,
    scratch: BytesMut,
    chunk_size: usize,
}

impl<R: Read> ReadChunks<R> {
    /// Wrap a reader using [`DEFAULT_CHUNK_SIZE`].
    pub fn new(inner: R) -> Self {
        Self::with_chunk_size(inner, DEFAULT_CHUNK_SIZE)
    }

    /// Wrap a reader, reading at most `chunk_size` bytes per chunk.
    pub fn with_chunk_size(inner: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            inner,
            scratch: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the adapter and return the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ChunkSource for ReadChunks<R> {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        // The bytes left after the previous split are still initialized;
        // only the consumed tail is zero-filled again.
        if self.scratch.len() < self.chunk_size {
            self.scratch.resize(self.chunk_size, 0);
        }
        loop {
            match self.inner.read(&mut self.scratch[..]) {
                Ok(0) => return Ok(None),
                Ok(n) => return Ok(Some(self.scratch.split_to(n).freeze())),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}
