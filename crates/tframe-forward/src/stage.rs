use std::sync::Arc;
use std::time::Duration;

use tframe_frame::Frame;
use tracing::{trace, warn};

use crate::clock::Clock;
use crate::codec::MessageCodec;
use crate::envelope::MessageEnvelope;
use crate::error::ForwardError;
use crate::metrics::{Encoding, MetricsWindow, ReportSink};
use crate::reporter::{CloseSignal, MetricsReporter};

/// Classifies, measures and forwards reassembled frames.
///
/// Several stages may share one [`MetricsWindow`] and [`CloseSignal`] (one
/// stage per connection, one reporter per listener); see
/// [`with_window`](Self::with_window).
#[derive(Debug)]
pub struct ForwardingStage<C> {
    codec: C,
    window: Arc<MetricsWindow>,
    close: CloseSignal,
}

impl<C: MessageCodec> ForwardingStage<C> {
    /// A stage with its own window and close flag.
    pub fn new(codec: C) -> Self {
        Self::with_window(codec, Arc::new(MetricsWindow::new()), CloseSignal::new())
    }

    /// A stage recording into a shared window.
    pub fn with_window(codec: C, window: Arc<MetricsWindow>, close: CloseSignal) -> Self {
        Self {
            codec,
            window,
            close,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn window(&self) -> &Arc<MetricsWindow> {
        &self.window
    }

    pub fn close_signal(&self) -> &CloseSignal {
        &self.close
    }

    /// Build a reporter that drains this stage's window every `period`.
    pub fn reporter(
        &self,
        sink: impl ReportSink + 'static,
        clock: impl Clock + 'static,
        period: Duration,
    ) -> MetricsReporter {
        MetricsReporter::new(
            Arc::clone(&self.window),
            sink,
            clock,
            period,
            self.close.clone(),
        )
    }

    /// Ask the reporter to stop after its next report.
    pub fn close(&self) {
        self.close.close();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_closed()
    }

    /// Classify and measure one frame, producing its envelope.
    ///
    /// Counters are only touched when the frame is accepted.
    pub fn process(&self, frame: &Frame) -> Result<MessageEnvelope<C::Message>, ForwardError> {
        let payload = frame.payload();

        let envelope = if self.codec.is_json(&payload) {
            let parsed = self
                .codec
                .decode(&payload)
                .map_err(|source| ForwardError::Decode {
                    encoding: Encoding::Json,
                    source,
                })?;
            let dimensions = self.codec.dimensions(&parsed);
            let client_id = self.codec.client_id(&parsed);
            let forward = self.codec.encode(&parsed).map_err(ForwardError::Encode)?;
            MessageEnvelope::json(frame, parsed, client_id, dimensions, forward)
        } else {
            let dimensions =
                self.codec
                    .binary_dimensions(&payload)
                    .map_err(|source| ForwardError::Decode {
                        encoding: Encoding::Binary,
                        source,
                    })?;
            MessageEnvelope::binary(frame, dimensions)
        };

        self.window
            .record(envelope.encoding(), envelope.dimensions.volume());
        trace!(
            encoding = %envelope.encoding(),
            volume = envelope.dimensions.volume(),
            len = frame.len(),
            "frame forwarded"
        );
        Ok(envelope)
    }

    /// [`process`](Self::process) one frame, dropping it on failure.
    ///
    /// Failures are logged and counted as rejected; they never affect later
    /// frames. Returns whether an envelope was emitted.
    pub fn forward<F>(&self, frame: &Frame, mut emit: F) -> bool
    where
        F: FnMut(MessageEnvelope<C::Message>),
    {
        match self.process(frame) {
            Ok(envelope) => {
                emit(envelope);
                true
            }
            Err(err) => {
                self.window.record_rejected();
                warn!(error = %err, len = frame.len(), "dropping frame");
                false
            }
        }
    }
}
