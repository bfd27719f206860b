use std::fs;

use tframe_forward::GridCodec;
use tframe_frame::{encode_frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use tframe_transport::{NetStream, TcpTransport};
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    if args.chunk_size == Some(0) {
        return Err(CliError::usage("--chunk-size must be greater than zero"));
    }

    let payload = resolve_payload(&args)?;
    let wire = build_wire(&payload, args.count)?;

    let stream = TcpTransport::connect_timeout(args.addr.as_str(), wait_timeout)
        .map_err(|err| transport_error("connect failed", err))?;
    let _ = stream.set_nodelay(true);
    let read_half = stream
        .try_clone()
        .map_err(|err| transport_error("connect failed", err))?;

    let mut writer = FrameWriter::new(stream);
    write_chunked(&mut writer, &wire, args.chunk_size)
        .map_err(|err| frame_error("send failed", err))?;
    // EOF tells the server the stream ended on a frame boundary.
    writer
        .get_ref()
        .shutdown_write()
        .map_err(|err| transport_error("send failed", err))?;
    debug!(bytes = wire.len(), frames = args.count, "sent");

    if args.wait {
        let config = FrameConfig {
            read_timeout: Some(wait_timeout),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_net(read_half, config)
            .map_err(|err| frame_error("receive failed", err))?;
        for _ in 0..args.count {
            match reader.read_frame() {
                Ok(frame) => print_response(&frame, format),
                // The server dropped some frames; nothing more is coming.
                Err(FrameError::ConnectionClosed) => break,
                Err(err) => return Err(frame_error("receive failed", err)),
            }
        }
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::usage(format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }

    let body = match (&args.data, &args.file) {
        (Some(data), _) => data.as_bytes().to_vec(),
        (None, Some(path)) => read_file(path)?,
        (None, None) => Vec::new(),
    };

    match &args.grid {
        Some(value) => {
            let (rows, columns) = parse_grid(value)?;
            Ok(GridCodec::encode_binary(rows, columns, &body).to_vec())
        }
        None => Ok(body),
    }
}

fn read_file(path: &std::path::Path) -> CliResult<Vec<u8>> {
    fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

/// Parse `ROWSxCOLUMNS`.
fn parse_grid(value: &str) -> CliResult<(u32, u32)> {
    let invalid =
        || CliError::usage(format!("invalid --grid value: {value} (expected ROWSxCOLUMNS)"));
    let (rows, columns) = value.split_once(['x', 'X']).ok_or_else(invalid)?;
    let rows = rows.trim().parse().map_err(|_| invalid())?;
    let columns = columns.trim().parse().map_err(|_| invalid())?;
    Ok((rows, columns))
}

fn build_wire(payload: &[u8], count: usize) -> CliResult<Vec<u8>> {
    let mut wire = bytes::BytesMut::new();
    for _ in 0..count {
        encode_frame(payload, &mut wire).map_err(|err| frame_error("encode failed", err))?;
    }
    Ok(wire.to_vec())
}

fn write_chunked(
    writer: &mut FrameWriter<NetStream>,
    wire: &[u8],
    chunk_size: Option<usize>,
) -> Result<(), FrameError> {
    let step = chunk_size.unwrap_or(wire.len()).max(1);
    for piece in wire.chunks(step) {
        writer.write_all(piece)?;
        writer.flush()?;
    }
    Ok(())
}
