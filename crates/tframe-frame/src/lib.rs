//! Length-prefixed frame reassembly for TCP byte streams.
//!
//! This is the core value-add layer of tframe. Every message on the wire is:
//! - A 4-byte little-endian `totalLength` that counts the header itself
//! - `totalLength - 4` bytes of payload
//!
//! The [`Reassembler`] turns arbitrarily-chunked reads back into whole frames.
//! Frames that arrive inside a single chunk are handed out as zero-copy views;
//! frames spanning chunks are stitched together with exactly one allocation.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod reassembler;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use codec::{encode_frame, Frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use reassembler::Reassembler;
pub use writer::FrameWriter;
