use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::Clock;
use crate::metrics::{MetricsWindow, ReportSink, WindowReport};

/// Cooperative stop flag shared between a stage and its reporter.
///
/// Setting the flag does not interrupt anything: the reporter notices it
/// after its next report, so stopping takes at most one window.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal(Arc<AtomicBool>);

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of one [`MetricsReporter::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The window is still open; poll again after `until`.
    Pending { until: Duration },
    /// A report was emitted and the window reset.
    Reported,
    /// The close flag was seen after the final report. Further polls are no-ops.
    Stopped,
}

/// Drains a [`MetricsWindow`] into a [`ReportSink`] once per period.
///
/// The reporter owns no thread or timer. A driver calls [`poll`](Self::poll)
/// and sleeps for whatever it is told; [`spawn_reporter_thread`] and
/// `run_reporter` are the two drivers shipped here.
pub struct MetricsReporter {
    window: Arc<MetricsWindow>,
    sink: Box<dyn ReportSink>,
    clock: Box<dyn Clock>,
    period: Duration,
    deadline: Instant,
    close: CloseSignal,
    stopped: bool,
}

impl MetricsReporter {
    /// Create a reporter whose first window ends one `period` from now.
    pub fn new(
        window: Arc<MetricsWindow>,
        sink: impl ReportSink + 'static,
        clock: impl Clock + 'static,
        period: Duration,
        close: CloseSignal,
    ) -> Self {
        let deadline = clock.now() + period;
        Self {
            window,
            sink: Box::new(sink),
            clock: Box::new(clock),
            period,
            deadline,
            close,
            stopped: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Report and reset if the window has elapsed, then honour the close flag.
    pub fn poll(&mut self) -> Tick {
        if self.stopped {
            return Tick::Stopped;
        }

        let now = self.clock.now();
        if now < self.deadline {
            return Tick::Pending {
                until: self.deadline - now,
            };
        }

        let report = WindowReport::new(self.window.take(), self.period);
        self.sink.report(&report);

        self.deadline += self.period;
        if self.deadline <= now {
            // Fell more than a full window behind; do not burst-report.
            self.deadline = now + self.period;
        }

        if self.close.is_closed() {
            debug!("metrics reporter stopped");
            self.stopped = true;
            return Tick::Stopped;
        }
        Tick::Reported
    }
}

impl std::fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("period", &self.period)
            .field("deadline", &self.deadline)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

/// Drive `reporter` on a dedicated OS thread until it stops.
pub fn spawn_reporter_thread(mut reporter: MetricsReporter) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("tframe-metrics".to_string())
        .spawn(move || loop {
            match reporter.poll() {
                Tick::Pending { until } => std::thread::sleep(until),
                Tick::Reported => {}
                Tick::Stopped => break,
            }
        })
}

/// Drive `reporter` on the tokio runtime until it stops.
#[cfg(feature = "async")]
pub async fn run_reporter(mut reporter: MetricsReporter) {
    loop {
        match reporter.poll() {
            Tick::Pending { until } => tokio::time::sleep(until).await,
            Tick::Reported => tokio::task::yield_now().await,
            Tick::Stopped => break,
        }
    }
}
