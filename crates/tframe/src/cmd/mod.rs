use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use tframe_frame::DEFAULT_MAX_FRAME_SIZE;
use tframe_transport::DEFAULT_CHUNK_SIZE;

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections, forward every frame back and report metrics per window.
    Serve(ServeArgs),
    /// Send frames to a server, optionally in small chunks.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:7000).
    pub addr: String,
    /// Largest accepted frame in bytes, header included.
    #[arg(long, env = "TFRAME_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
    /// Metrics window length (e.g. 10s, 500ms).
    #[arg(long, env = "TFRAME_WINDOW", default_value = "10s")]
    pub window: String,
    /// Read size per socket read.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Drop a connection that stays silent this long (e.g. 30s).
    #[arg(long)]
    pub idle_timeout: Option<String>,
    /// Exit after serving N connections.
    #[arg(long)]
    pub connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server address.
    pub addr: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file", "grid"])]
    pub json: Option<String>,
    /// Raw string payload. With --grid, the body after the dimensions.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Binary grid payload with the given dimensions (e.g. 4x8).
    #[arg(long, value_name = "ROWSxCOLUMNS", conflicts_with = "json")]
    pub grid: Option<String>,
    /// Number of times to send the payload.
    #[arg(long, default_value_t = 1)]
    pub count: usize,
    /// Split the outgoing bytes into writes of at most this many bytes.
    #[arg(long)]
    pub chunk_size: Option<usize>,
    /// Wait for forwarded responses and print them.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for each response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `10s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
