use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tframe_forward::{GridCodec, MessageCodec, SessionSummary, WindowCounts, WindowReport};
use tframe_frame::Frame;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Payload bytes only (responses); reports fall back to `pretty`.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    event: &'static str,
    listener: &'a str,
    timestamp: String,
    window_secs: f64,
    json_per_sec: f64,
    binary_per_sec: f64,
    json_volume_per_sec: f64,
    binary_volume_per_sec: f64,
    counts: WindowCounts,
}

pub fn print_report(report: &WindowReport, listener: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ReportOutput {
                event: "window",
                listener,
                timestamp: now_unix_seconds(),
                window_secs: report.window.as_secs_f64(),
                json_per_sec: report.json_count_per_sec(),
                binary_per_sec: report.binary_count_per_sec(),
                json_volume_per_sec: report.json_volume_per_sec(),
                binary_volume_per_sec: report.binary_volume_per_sec(),
                counts: report.counts,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENCODING", "MSG/S", "VOLUME/S", "MESSAGES", "VOLUME"])
                .add_row(vec![
                    "json".to_string(),
                    format!("{:.2}", report.json_count_per_sec()),
                    format!("{:.2}", report.json_volume_per_sec()),
                    report.counts.json_count.to_string(),
                    report.counts.json_volume.to_string(),
                ])
                .add_row(vec![
                    "binary".to_string(),
                    format!("{:.2}", report.binary_count_per_sec()),
                    format!("{:.2}", report.binary_volume_per_sec()),
                    report.counts.binary_count.to_string(),
                    report.counts.binary_volume.to_string(),
                ]);
            println!(
                "{listener} window={:?} rejected={}",
                report.window, report.counts.rejected
            );
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "{listener}: json {:.2} msg/s ({:.2} vol/s), binary {:.2} msg/s ({:.2} vol/s), rejected {}",
                report.json_count_per_sec(),
                report.json_volume_per_sec(),
                report.binary_count_per_sec(),
                report.binary_volume_per_sec(),
                report.counts.rejected
            );
        }
    }
}

#[derive(Serialize)]
struct SessionOutput<'a> {
    event: &'static str,
    peer: &'a str,
    #[serde(flatten)]
    summary: &'a SessionSummary,
    error: Option<&'a str>,
}

/// One line per finished connection. `error` is set when it ended abnormally.
pub fn print_session(peer: &str, summary: &SessionSummary, error: Option<&str>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SessionOutput {
            event: "session",
            peer,
            summary,
            error,
        }),
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "{peer}: frames={} forwarded={} rejected={} bytes={}{}",
                summary.frames,
                summary.forwarded,
                summary.rejected,
                summary.bytes_read,
                error.map(|e| format!(" error=\"{e}\"")).unwrap_or_default()
            );
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput {
    event: &'static str,
    encoding: &'static str,
    total_length: u32,
    payload_size: usize,
    payload: String,
}

pub fn print_response(frame: &Frame, format: OutputFormat) {
    let payload = frame.payload();
    let encoding = if GridCodec.is_json(&payload) {
        "json"
    } else {
        "binary"
    };

    match format {
        OutputFormat::Json => print_json(&ResponseOutput {
            event: "response",
            encoding,
            total_length: frame.total_length(),
            payload_size: payload.len(),
            payload: payload_preview(&payload),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ENCODING", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    encoding.to_string(),
                    payload.len().to_string(),
                    payload_preview(&payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "encoding={encoding} size={} payload={}",
                payload.len(),
                payload_preview(&payload)
            );
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            let _ = out.write_all(&payload);
            let _ = out.flush();
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
