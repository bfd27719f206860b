use std::time::Duration;

use bytes::Bytes;
use tframe_frame::{FrameConfig, Reassembler};
use tracing::debug;

use crate::codec::MessageCodec;
use crate::envelope::MessageEnvelope;
use crate::error::Result;
use crate::stage::ForwardingStage;

/// Default metrics window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Configuration for a reassembly + forwarding pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub frame: FrameConfig,
    /// Length of one metrics window. Default: 10 s.
    pub window: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            window: DEFAULT_WINDOW,
        }
    }
}

/// Running totals for one pipeline. Never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub forwarded: u64,
    pub rejected: u64,
}

/// Chunks in, envelopes out.
///
/// Composes a [`Reassembler`] with a [`ForwardingStage`]. Reassembly errors
/// end the pipeline; codec errors drop a single frame.
#[derive(Debug)]
pub struct Pipeline<C> {
    reassembler: Reassembler,
    stage: ForwardingStage<C>,
    stats: PipelineStats,
}

impl<C: MessageCodec> Pipeline<C> {
    pub fn new(codec: C, config: &PipelineConfig) -> Self {
        Self::from_parts(
            Reassembler::with_config(&config.frame),
            ForwardingStage::new(codec),
        )
    }

    pub fn from_parts(reassembler: Reassembler, stage: ForwardingStage<C>) -> Self {
        Self {
            reassembler,
            stage,
            stats: PipelineStats::default(),
        }
    }

    /// Process one chunk, emitting an envelope for every frame it completes.
    ///
    /// Returns the number of envelopes emitted. Once the stage's close signal
    /// is set, no chunk is processed again and every call fails with
    /// `FrameError::Closed`.
    pub fn feed<F>(&mut self, chunk: Bytes, mut emit: F) -> Result<usize>
    where
        F: FnMut(MessageEnvelope<C::Message>),
    {
        if self.stage.is_closed() && !self.reassembler.is_closed() {
            self.reassembler.close();
        }
        let stage = &self.stage;
        let stats = &mut self.stats;
        let mut emitted = 0usize;
        self.reassembler.feed_with(chunk, |frame| {
            stats.frames += 1;
            if stage.forward(&frame, &mut emit) {
                stats.forwarded += 1;
                emitted += 1;
            } else {
                stats.rejected += 1;
            }
        })?;
        Ok(emitted)
    }

    /// End of input. Fails with `Truncated` if a frame was left incomplete.
    ///
    /// The metrics window is left running: other connections may share it.
    pub fn finish(&mut self) -> Result<()> {
        self.reassembler.finish()?;
        debug!(
            frames = self.stats.frames,
            rejected = self.stats.rejected,
            "pipeline finished"
        );
        Ok(())
    }

    /// Abrupt close: drop any partial frame and signal the reporter to stop.
    pub fn close(&mut self) {
        self.reassembler.close();
        self.stage.close();
    }

    pub fn stage(&self) -> &ForwardingStage<C> {
        &self.stage
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tframe_frame::{encode_frame, FrameError};

    use super::*;
    use crate::error::PipelineError;
    use crate::grid::GridCodec;

    fn wire(payloads: &[&[u8]]) -> Bytes {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.freeze()
    }

    fn pipeline() -> Pipeline<GridCodec> {
        Pipeline::new(GridCodec, &PipelineConfig::default())
    }

    #[test]
    fn forwards_in_order_across_chunks() {
        let binary = GridCodec::encode_binary(2, 2, b"");
        let wire = wire(&[br#"{"rows":1,"columns":1}"#, &binary, br#"{"rows":3,"columns":3}"#]);
        let mut pipeline = pipeline();
        let mut out = Vec::new();

        let (a, rest) = (wire.slice(..3), wire.slice(3..));
        let (b, c) = (rest.slice(..20), rest.slice(20..));
        for chunk in [a, b, c] {
            pipeline.feed(chunk, |env| out.push(env)).unwrap();
        }
        pipeline.finish().unwrap();

        let kinds: Vec<_> = out.iter().map(|e| (e.is_json, e.volume())).collect();
        assert_eq!(kinds, vec![(true, 1), (false, 4), (true, 9)]);
        assert_eq!(
            pipeline.stats(),
            PipelineStats {
                frames: 3,
                forwarded: 3,
                rejected: 0
            }
        );
    }

    #[test]
    fn bad_payload_does_not_poison_stream() {
        let mut pipeline = pipeline();
        let good = GridCodec::encode_binary(1, 5, b"");
        let emitted = pipeline
            .feed(wire(&[b"{broken", &good]), |_| {})
            .unwrap();

        assert_eq!(emitted, 1);
        assert_eq!(pipeline.stats().rejected, 1);
        assert_eq!(pipeline.stage().window().snapshot().rejected, 1);
    }

    #[test]
    fn protocol_violation_is_fatal() {
        let mut pipeline = pipeline();
        let err = pipeline
            .feed(Bytes::from_static(&[2, 0, 0, 0]), |_| {})
            .unwrap_err();
        assert!(err.is_protocol_violation());

        let err = pipeline
            .feed(wire(&[&GridCodec::encode_binary(1, 1, b"")]), |_| {})
            .unwrap_err();
        assert!(matches!(err, PipelineError::Frame(FrameError::Closed)));
    }

    #[test]
    fn shared_close_stops_chunk_processing() {
        let mut pipeline = pipeline();
        let signal = pipeline.stage().close_signal().clone();
        pipeline
            .feed(wire(&[&GridCodec::encode_binary(1, 1, b"")]), |_| {})
            .unwrap();

        signal.close();
        let err = pipeline
            .feed(wire(&[&GridCodec::encode_binary(2, 2, b"")]), |_| {})
            .unwrap_err();

        assert!(matches!(err, PipelineError::Frame(FrameError::Closed)));
        assert!(pipeline.reassembler().is_closed());
        assert_eq!(pipeline.stats().frames, 1);
        assert_eq!(pipeline.stage().window().snapshot().binary_count, 1);
    }

    #[test]
    fn finish_mid_frame_is_truncated() {
        let mut pipeline = pipeline();
        pipeline
            .feed(Bytes::from_static(&[20, 0, 0, 0, 1]), |_| {})
            .unwrap();
        let err = pipeline.finish().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Frame(FrameError::Truncated { .. })
        ));
        assert!(!pipeline.stage().is_closed());
    }

    #[test]
    fn close_signals_stage() {
        let mut pipeline = pipeline();
        pipeline
            .feed(Bytes::from_static(&[20, 0]), |_| {})
            .unwrap();
        pipeline.close();
        assert!(pipeline.stage().is_closed());
        assert!(pipeline.reassembler().is_closed());
    }

    #[test]
    fn frame_limit_comes_from_config() {
        let config = PipelineConfig {
            frame: FrameConfig {
                max_frame_size: 8,
                ..FrameConfig::default()
            },
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::new(GridCodec, &config);
        let err = pipeline
            .feed(wire(&[b"way too long"]), |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Frame(FrameError::FrameTooLarge { .. })
        ));
    }
}
