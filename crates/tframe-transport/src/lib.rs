//! TCP transport abstraction.
//!
//! This is the lowest layer of tframe. It hands out connected [`NetStream`]s
//! and turns any reader into a [`ChunkSource`] that delivers bytes in arrival
//! order, one read at a time. Everything else builds on top of those chunks:
//! their boundaries have no relation to frame boundaries.

pub mod chunks;
pub mod error;
pub mod stream;
pub mod tcp;

pub use chunks::{ChunkSource, ReadChunks, DEFAULT_CHUNK_SIZE};
pub use error::{Result, TransportError};
pub use stream::NetStream;
pub use tcp::TcpTransport;
