use std::collections::VecDeque;
use std::io::Read;

use tframe_transport::{ChunkSource, NetStream, ReadChunks};

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reassembler::Reassembler;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Every read becomes one chunk for the [`Reassembler`], so a single read may
/// yield several frames; the extras are queued for subsequent calls.
///
/// A protocol violation is reported after the frames that preceded it, then
/// every later call fails with [`FrameError::Closed`].
pub struct FrameReader<T> {
    chunks: ReadChunks<T>,
    reassembler: Reassembler,
    ready: VecDeque<Frame>,
    failure: Option<FrameError>,
    at_eof: bool,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            chunks: ReadChunks::with_chunk_size(inner, READ_CHUNK_SIZE),
            reassembler: Reassembler::with_config(&config),
            ready: VecDeque::new(),
            failure: None,
            at_eof: false,
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF falls on a frame
    /// boundary and `Err(FrameError::Truncated { .. })` when it does not.
    /// Only a clean EOF repeats `ConnectionClosed`; after any other terminal
    /// error the reader answers `Closed`.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }
            if let Some(err) = self.failure.take() {
                return Err(err);
            }
            if self.reassembler.is_closed() {
                return Err(if self.at_eof {
                    FrameError::ConnectionClosed
                } else {
                    FrameError::Closed
                });
            }

            let chunk = match self.chunks.next_chunk().map_err(transport_to_frame_error)? {
                Some(chunk) => chunk,
                None => {
                    self.reassembler.finish()?;
                    self.at_eof = true;
                    return Err(FrameError::ConnectionClosed);
                }
            };

            let ready = &mut self.ready;
            if let Err(err) = self.reassembler.feed_with(chunk, |frame| ready.push_back(frame)) {
                // Hand out the frames that preceded the violation first.
                self.failure = Some(err);
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.chunks.get_ref()
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        self.chunks.get_mut()
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Any frames already reassembled but not yet returned are dropped.
    pub fn into_inner(self) -> T {
        self.chunks.into_inner()
    }

    /// Update maximum frame size for subsequent frame headers.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
        self.reassembler.set_max_frame_size(max_frame_size);
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<NetStream> {
    /// Create a frame reader for `NetStream` and apply read timeout from config.
    pub fn with_config_net(inner: NetStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: tframe_transport::TransportError) -> FrameError {
    match err {
        tframe_transport::TransportError::Io(io)
        | tframe_transport::TransportError::Accept(io) => FrameError::Io(io),
        tframe_transport::TransportError::Bind { source, .. }
        | tframe_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
