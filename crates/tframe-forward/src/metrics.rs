use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// How a payload was classified by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Json,
    Binary,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Binary => "binary",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw counter values for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub json_count: u64,
    pub binary_count: u64,
    pub json_volume: u64,
    pub binary_volume: u64,
    /// Frames the codec refused. Not part of the four workload counters.
    pub rejected: u64,
}

impl WindowCounts {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    pub fn total_count(&self) -> u64 {
        self.json_count + self.binary_count
    }
}

/// Message and workload-volume counters, one pair per encoding.
///
/// All five counters sit behind one lock, so a message's count and its
/// volume always land in the same window even while the reporter drains
/// from another thread.
#[derive(Debug, Default)]
pub struct MetricsWindow {
    counts: Mutex<WindowCounts>,
}

impl MetricsWindow {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WindowCounts> {
        // Plain integers cannot be left half-updated by a panicking holder.
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one message of `encoding` carrying `volume` units of work.
    pub fn record(&self, encoding: Encoding, volume: u64) {
        let mut counts = self.lock();
        match encoding {
            Encoding::Json => {
                counts.json_count += 1;
                counts.json_volume = counts.json_volume.saturating_add(volume);
            }
            Encoding::Binary => {
                counts.binary_count += 1;
                counts.binary_volume = counts.binary_volume.saturating_add(volume);
            }
        }
    }

    pub fn record_rejected(&self) {
        self.lock().rejected += 1;
    }

    /// Current values without resetting.
    pub fn snapshot(&self) -> WindowCounts {
        *self.lock()
    }

    /// Current values, resetting every counter to zero in the same step.
    pub fn take(&self) -> WindowCounts {
        std::mem::take(&mut *self.lock())
    }
}

/// One drained window, as handed to a [`ReportSink`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowReport {
    #[serde(flatten)]
    pub counts: WindowCounts,
    #[serde(rename = "window_secs", serialize_with = "serialize_secs")]
    pub window: Duration,
}

impl WindowReport {
    pub fn new(counts: WindowCounts, window: Duration) -> Self {
        Self { counts, window }
    }

    fn per_second(&self, value: u64) -> f64 {
        let secs = self.window.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        value as f64 / secs
    }

    pub fn json_count_per_sec(&self) -> f64 {
        self.per_second(self.counts.json_count)
    }

    pub fn binary_count_per_sec(&self) -> f64 {
        self.per_second(self.counts.binary_count)
    }

    pub fn json_volume_per_sec(&self) -> f64 {
        self.per_second(self.counts.json_volume)
    }

    pub fn binary_volume_per_sec(&self) -> f64 {
        self.per_second(self.counts.binary_volume)
    }
}

fn serialize_secs<S: serde::Serializer>(window: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(window.as_secs_f64())
}

/// Observability sink invoked once per window.
pub trait ReportSink: Send + Sync {
    fn report(&self, report: &WindowReport);
}

impl<F> ReportSink for F
where
    F: Fn(&WindowReport) + Send + Sync,
{
    fn report(&self, report: &WindowReport) {
        self(report)
    }
}

/// Emits each report as a structured `tracing` event.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    label: Option<String>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every report with `label`, typically the listening address.
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

impl ReportSink for TracingSink {
    fn report(&self, report: &WindowReport) {
        tracing::info!(
            listener = self.label.as_deref().unwrap_or("-"),
            window_secs = report.window.as_secs_f64(),
            json_per_sec = report.json_count_per_sec(),
            binary_per_sec = report.binary_count_per_sec(),
            json_volume_per_sec = report.json_volume_per_sec(),
            binary_volume_per_sec = report.binary_volume_per_sec(),
            rejected = report.counts.rejected,
            "metrics window"
        );
    }
}
