use std::io::Write;

use serde::Serialize;
use tframe_frame::{FrameConfig, FrameWriter};
use tframe_transport::{ChunkSource, NetStream, ReadChunks};
use tracing::debug;

use crate::codec::MessageCodec;
use crate::envelope::MessageEnvelope;
use crate::error::Result;
use crate::pipeline::Pipeline;

/// Totals for one finished (or failed) connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub frames: u64,
    pub forwarded: u64,
    pub rejected: u64,
    pub bytes_read: u64,
}

/// Blocking per-connection loop.
///
/// Pulls chunks from `S`, runs them through the [`Pipeline`] and writes each
/// forwarded message back out through `W`, framed. Returns on EOF or on the
/// first connection-level error.
pub struct Session<C, S, W> {
    chunks: S,
    writer: FrameWriter<W>,
    pipeline: Pipeline<C>,
    bytes_read: u64,
}

impl<C, S, W> Session<C, S, W>
where
    C: MessageCodec,
    S: ChunkSource,
    W: Write,
{
    pub fn new(chunks: S, writer: FrameWriter<W>, pipeline: Pipeline<C>) -> Self {
        Self {
            chunks,
            writer,
            pipeline,
            bytes_read: 0,
        }
    }

    /// Run until the peer closes its write half or the stage is closed.
    ///
    /// EOF on a frame boundary is a clean finish; EOF inside a frame is
    /// `Truncated`. A close from the stage's signal (possibly shared with
    /// other sessions) ends the loop before the next chunk is processed and
    /// returns the totals so far.
    pub fn run(&mut self) -> Result<SessionSummary> {
        let mut outbound = Vec::new();
        loop {
            if self.pipeline.stage().is_closed() {
                return Ok(self.abort());
            }
            let next = self.chunks.next_chunk();
            if self.pipeline.stage().is_closed() {
                return Ok(self.abort());
            }
            let Some(chunk) = next? else {
                break;
            };
            self.bytes_read += chunk.len() as u64;

            let fed = self.pipeline.feed(chunk, |env| outbound.push(env));
            // Envelopes completed before a violation still reach the peer.
            self.write_out(&mut outbound)?;
            fed?;
        }

        self.pipeline.finish()?;
        let summary = self.summary();
        debug!(
            frames = summary.frames,
            forwarded = summary.forwarded,
            bytes = summary.bytes_read,
            "session complete"
        );
        Ok(summary)
    }

    fn write_out(&mut self, outbound: &mut Vec<MessageEnvelope<C::Message>>) -> Result<()> {
        if outbound.is_empty() {
            return Ok(());
        }
        for env in outbound.drain(..) {
            self.writer.write_all(&env.to_wire()?)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    fn abort(&mut self) -> SessionSummary {
        self.pipeline.close();
        let summary = self.summary();
        debug!(
            frames = summary.frames,
            bytes = summary.bytes_read,
            "session closed"
        );
        summary
    }

    pub fn summary(&self) -> SessionSummary {
        let stats = self.pipeline.stats();
        SessionSummary {
            frames: stats.frames,
            forwarded: stats.forwarded,
            rejected: stats.rejected,
            bytes_read: self.bytes_read,
        }
    }

    pub fn pipeline(&self) -> &Pipeline<C> {
        &self.pipeline
    }

    /// Abort: drop partial state and signal the stage's reporter.
    pub fn close(&mut self) {
        self.pipeline.close();
    }
}

impl<C: MessageCodec> Session<C, ReadChunks<NetStream>, NetStream> {
    /// Session over an accepted TCP connection, applying the configured
    /// timeouts to both halves.
    pub fn over_tcp(
        stream: NetStream,
        pipeline: Pipeline<C>,
        config: &FrameConfig,
        chunk_size: usize,
    ) -> Result<Self> {
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_nodelay(true)?;
        let write_half = stream.try_clone()?;
        let writer = FrameWriter::with_config_net(write_half, config.clone())?;
        Ok(Self::new(
            ReadChunks::with_chunk_size(stream, chunk_size),
            writer,
            pipeline,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use bytes::{Bytes, BytesMut};
    use tframe_frame::{encode_frame, FrameError, Reassembler};

    use super::*;
    use crate::error::PipelineError;
    use crate::grid::GridCodec;
    use crate::pipeline::PipelineConfig;
    use crate::reporter::CloseSignal;

    /// Replays fixed chunks, then EOF.
    struct Scripted(VecDeque<Bytes>);

    impl ChunkSource for Scripted {
        fn next_chunk(&mut self) -> tframe_transport::Result<Option<Bytes>> {
            Ok(self.0.pop_front())
        }
    }

    fn scripted(wire: &Bytes, cuts: &[usize]) -> Scripted {
        let mut chunks = VecDeque::new();
        let mut start = 0;
        for &cut in cuts {
            chunks.push_back(wire.slice(start..cut));
            start = cut;
        }
        chunks.push_back(wire.slice(start..));
        Scripted(chunks)
    }

    fn session(source: Scripted) -> Session<GridCodec, Scripted, Cursor<Vec<u8>>> {
        Session::new(
            source,
            FrameWriter::new(Cursor::new(Vec::new())),
            Pipeline::new(GridCodec, &PipelineConfig::default()),
        )
    }

    fn encode(payloads: &[&[u8]]) -> Bytes {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.freeze()
    }

    #[test]
    fn echoes_forwarded_messages() {
        let binary = GridCodec::encode_binary(2, 8, b"cells");
        let wire = encode(&[br#"{ "rows": 2, "columns": 2 }"#, b"nope", &binary]);
        let mut session = session(scripted(&wire, &[2, 17, 33]));

        let summary = session.run().unwrap();

        assert_eq!(
            summary,
            SessionSummary {
                frames: 3,
                forwarded: 2,
                rejected: 1,
                bytes_read: wire.len() as u64,
            }
        );

        let out = Bytes::from(session.writer.get_ref().get_ref().clone());
        let frames = Reassembler::default().feed(out).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload().as_ref(), br#"{"rows":2,"columns":2}"#);
        assert_eq!(frames[1].payload(), binary);
    }

    #[test]
    fn eof_mid_frame_is_truncated() {
        let wire = encode(&[&GridCodec::encode_binary(1, 1, b"abc")]);
        let cut = wire.slice(..wire.len() - 1);
        let mut session = session(scripted(&cut, &[5]));

        let err = session.run().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Frame(FrameError::Truncated { .. })
        ));
        assert_eq!(session.summary().bytes_read, cut.len() as u64);
    }

    #[test]
    fn frames_before_violation_are_written() {
        let binary = GridCodec::encode_binary(2, 3, b"");
        let mut wire = BytesMut::from(&encode(&[&binary])[..]);
        wire.extend_from_slice(&[1, 0, 0, 0]);
        let mut session = session(Scripted(VecDeque::from([wire.freeze()])));

        let err = session.run().unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(session.summary().forwarded, 1);

        let out = Bytes::from(session.writer.get_ref().get_ref().clone());
        let frames = Reassembler::default().feed(out).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), binary);
    }

    /// Sets the shared close flag as it hands out its first chunk.
    struct ClosingSource {
        signal: CloseSignal,
        chunks: VecDeque<Bytes>,
        delivered: usize,
    }

    impl ChunkSource for ClosingSource {
        fn next_chunk(&mut self) -> tframe_transport::Result<Option<Bytes>> {
            self.signal.close();
            self.delivered += 1;
            Ok(self.chunks.pop_front())
        }
    }

    #[test]
    fn close_stops_processing_further_chunks() {
        let pipeline = Pipeline::new(GridCodec, &PipelineConfig::default());
        let signal = pipeline.stage().close_signal().clone();
        let frame = encode(&[&GridCodec::encode_binary(1, 1, b"")]);
        let source = ClosingSource {
            signal,
            chunks: VecDeque::from([frame.clone(), frame.clone(), frame]),
            delivered: 0,
        };
        let mut session = Session::new(
            source,
            FrameWriter::new(Cursor::new(Vec::new())),
            pipeline,
        );

        let summary = session.run().unwrap();

        assert_eq!(summary, SessionSummary::default());
        assert_eq!(session.chunks.delivered, 1);
        assert!(session.pipeline().reassembler().is_closed());
        assert!(session.writer.get_ref().get_ref().is_empty());
        assert!(session.pipeline().stage().window().snapshot().is_zero());
    }

    #[test]
    fn empty_connection_is_clean() {
        let mut session = session(Scripted(VecDeque::new()));
        assert_eq!(session.run().unwrap(), SessionSummary::default());
    }

    #[test]
    fn runs_over_tcp() {
        let listener = tframe_transport::TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let client = std::thread::spawn(move || {
            let stream = tframe_transport::TcpTransport::connect(addr).unwrap();
            let read_half = stream.try_clone().unwrap();
            let mut writer = FrameWriter::new(stream);
            writer.send(&GridCodec::encode_binary(3, 3, b"")).unwrap();
            writer.get_ref().shutdown_write().unwrap();

            let mut reader = tframe_frame::FrameReader::new(read_half);
            reader.read_frame().unwrap()
        });

        let (stream, _) = listener.accept().unwrap();
        let pipeline = Pipeline::new(GridCodec, &PipelineConfig::default());
        let mut session =
            Session::over_tcp(stream, pipeline, &FrameConfig::default(), 1024).unwrap();
        let summary = session.run().unwrap();

        let echoed = client.join().unwrap();
        assert_eq!(summary.forwarded, 1);
        assert_eq!(echoed.payload(), GridCodec::encode_binary(3, 3, b""));
        assert_eq!(session.pipeline().stage().window().snapshot().binary_volume, 9);
    }
}
