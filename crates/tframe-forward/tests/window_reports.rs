//! End-to-end: chunked bytes through the pipeline into per-window reports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tframe_forward::{
    GridCodec, ManualClock, Pipeline, PipelineConfig, Tick, WindowCounts, WindowReport,
};
use tframe_frame::encode_frame;

const WINDOW: Duration = Duration::from_secs(10);

fn json(rows: u32, columns: u32) -> Vec<u8> {
    format!(r#"{{"rows":{rows},"columns":{columns}}}"#).into_bytes()
}

fn binary(rows: u32, columns: u32) -> Vec<u8> {
    GridCodec::encode_binary(rows, columns, &[0xEE; 17]).to_vec()
}

fn wire(payloads: &[Vec<u8>]) -> Bytes {
    let mut buf = BytesMut::new();
    for payload in payloads {
        encode_frame(payload, &mut buf).unwrap();
    }
    buf.freeze()
}

/// Feed `wire` in chunks of `size` bytes.
fn feed_in_chunks(pipeline: &mut Pipeline<GridCodec>, wire: &Bytes, size: usize) -> usize {
    let mut forwarded = 0;
    let mut start = 0;
    while start < wire.len() {
        let end = (start + size).min(wire.len());
        forwarded += pipeline.feed(wire.slice(start..end), |_| {}).unwrap();
        start = end;
    }
    forwarded
}

type Reports = Arc<Mutex<Vec<WindowReport>>>;

fn collecting_sink() -> (Reports, impl Fn(&WindowReport) + Send + Sync + 'static) {
    let reports: Reports = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&reports);
    (reports, move |report: &WindowReport| {
        captured.lock().unwrap().push(*report)
    })
}

#[test]
fn report_matches_frames_seen_in_window() {
    let mut pipeline = Pipeline::new(GridCodec, &PipelineConfig::default());
    let clock = Arc::new(ManualClock::new());
    let (reports, sink) = collecting_sink();
    let mut reporter = pipeline.stage().reporter(sink, Arc::clone(&clock), WINDOW);

    let json_dims = [(1, 2), (3, 4), (5, 6)];
    let binary_dims = [(10, 10), (2, 50)];
    let mut payloads: Vec<Vec<u8>> = json_dims.iter().map(|&(r, c)| json(r, c)).collect();
    payloads.extend(binary_dims.iter().map(|&(r, c)| binary(r, c)));
    let wire = wire(&payloads);

    // Seven-byte chunks split most headers and bodies.
    assert_eq!(feed_in_chunks(&mut pipeline, &wire, 7), 5);
    pipeline.finish().unwrap();

    clock.advance(WINDOW);
    assert_eq!(reporter.poll(), Tick::Reported);

    let reports = reports.lock().unwrap();
    let report = reports[0];
    assert_eq!(
        report.counts,
        WindowCounts {
            json_count: 3,
            binary_count: 2,
            json_volume: 2 + 12 + 30,
            binary_volume: 100 + 100,
            rejected: 0,
        }
    );
    assert_eq!(report.json_count_per_sec(), 0.3);
    assert_eq!(report.binary_volume_per_sec(), 20.0);
}

#[test]
fn counters_are_zero_right_after_each_report() {
    let mut pipeline = Pipeline::new(GridCodec, &PipelineConfig::default());
    let clock = Arc::new(ManualClock::new());
    let (reports, sink) = collecting_sink();
    let mut reporter = pipeline.stage().reporter(sink, Arc::clone(&clock), WINDOW);

    for round in 1..=3u32 {
        feed_in_chunks(&mut pipeline, &wire(&[json(round, 1)]), 5);
        clock.advance(WINDOW);
        assert_eq!(reporter.poll(), Tick::Reported);
        assert!(pipeline.stage().window().snapshot().is_zero());
    }

    let volumes: Vec<_> = reports
        .lock()
        .unwrap()
        .iter()
        .map(|r| (r.counts.json_count, r.counts.json_volume))
        .collect();
    assert_eq!(volumes, vec![(1, 1), (1, 2), (1, 3)]);
}

#[test]
fn closing_the_pipeline_stops_the_reporter_within_one_window() {
    let mut pipeline = Pipeline::new(GridCodec, &PipelineConfig::default());
    let clock = Arc::new(ManualClock::new());
    let (reports, sink) = collecting_sink();
    let mut reporter = pipeline.stage().reporter(sink, Arc::clone(&clock), WINDOW);

    feed_in_chunks(&mut pipeline, &wire(&[binary(2, 2)]), 64);
    pipeline.close();

    clock.advance(WINDOW / 2);
    assert!(matches!(reporter.poll(), Tick::Pending { .. }));
    clock.advance(WINDOW / 2);
    assert_eq!(reporter.poll(), Tick::Stopped);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].counts.binary_volume, 4);
}

#[test]
fn hello_split_inside_header_survives_forwarding() {
    // `hello` is neither JSON nor a valid binary grid, so it is reassembled
    // and then rejected by the codec.
    let mut pipeline = Pipeline::new(GridCodec, &PipelineConfig::default());
    pipeline
        .feed(Bytes::from_static(&[0x09, 0x00]), |_| {})
        .unwrap();
    pipeline
        .feed(Bytes::from_static(&[0x00, 0x00, b'h', b'e', b'l', b'l', b'o']), |_| {})
        .unwrap();
    pipeline.finish().unwrap();

    let stats = pipeline.stats();
    assert_eq!((stats.frames, stats.rejected), (1, 1));
}
