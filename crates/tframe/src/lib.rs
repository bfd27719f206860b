//! Length-prefixed TCP frame reassembly with metrics-annotated forwarding.
//!
//! tframe turns an arbitrarily chunked TCP byte stream back into discrete
//! frames, classifies each one as JSON or binary, tallies per-window message
//! and workload counts, and forwards every accepted message downstream.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener/stream abstraction and chunked reads
//! - [`frame`]: Wire format, the reassembly engine, blocking reader/writer
//! - [`forward`]: Forwarding stage, metrics window and reporter, pipeline

/// Re-export transport types.
pub mod transport {
    pub use tframe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use tframe_frame::*;
}

/// Re-export forwarding types.
pub mod forward {
    pub use tframe_forward::*;
}
