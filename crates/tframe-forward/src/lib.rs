//! Metrics-annotated forwarding stage over reassembled frames.
//!
//! Sits directly on top of the [`tframe_frame::Reassembler`]: every frame is
//! classified as JSON or binary by a [`MessageCodec`], counted into a rolling
//! [`MetricsWindow`], and forwarded as a [`MessageEnvelope`]. JSON messages are
//! decoded and re-encoded on the way through; binary messages pass unchanged.
//!
//! A [`MetricsReporter`] drains the window once per period (10 s by default)
//! into a [`ReportSink`]. Time comes from an injected [`Clock`] so tests can
//! step it by hand.

pub mod clock;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod pipeline;
pub mod reporter;
pub mod session;
pub mod stage;
#[cfg(feature = "async")]
pub mod stream;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Dimensions, MessageCodec};
pub use envelope::MessageEnvelope;
pub use error::{CodecError, ForwardError, PipelineError, Result};
pub use grid::{GridCodec, GridRequest};
pub use metrics::{Encoding, MetricsWindow, ReportSink, TracingSink, WindowCounts, WindowReport};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats, DEFAULT_WINDOW};
#[cfg(feature = "async")]
pub use reporter::run_reporter;
pub use reporter::{spawn_reporter_thread, CloseSignal, MetricsReporter, Tick};
pub use session::{Session, SessionSummary};
pub use stage::ForwardingStage;
#[cfg(feature = "async")]
pub use stream::ForwardingStream;
