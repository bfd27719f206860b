use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tframe_forward::{
    spawn_reporter_thread, CloseSignal, ForwardingStage, GridCodec, MetricsReporter,
    MetricsWindow, Pipeline, PipelineConfig, Session, SystemClock, WindowReport,
};
use tframe_frame::{FrameConfig, Reassembler};
use tframe_transport::{NetStream, TcpTransport};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_report, print_session, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = pipeline_config(&args)?;
    let chunk_size = args.chunk_size.max(1);

    let listener =
        TcpTransport::bind(args.addr.as_str()).map_err(|err| transport_error("bind failed", err))?;
    let local = listener.local_addr();
    info!(addr = %local, window = ?config.window, "serving");

    let window = Arc::new(MetricsWindow::new());
    let close = CloseSignal::new();

    let label = local.to_string();
    let reporter = MetricsReporter::new(
        Arc::clone(&window),
        move |report: &WindowReport| print_report(report, &label, format),
        SystemClock,
        config.window,
        close.clone(),
    );
    let reporter = spawn_reporter_thread(reporter)
        .map_err(|err| io_error("failed to start metrics reporter", err))?;

    let live = LiveConnections::default();
    install_ctrlc_handler(close.clone(), local, live.clone())?;

    let mut sessions: Vec<JoinHandle<()>> = Vec::new();
    let mut accepted = 0usize;
    while !close.is_closed() {
        if args.connections.is_some_and(|limit| accepted >= limit) {
            break;
        }

        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(err) => {
                close.close();
                return Err(transport_error("accept failed", err));
            }
        };
        if close.is_closed() {
            // Woken by the shutdown handler.
            break;
        }
        accepted += 1;

        match stream.try_clone() {
            Ok(handle) => live.insert(peer, handle),
            Err(err) => warn!(%peer, error = %err, "cannot track connection for shutdown"),
        }
        let stage = ForwardingStage::with_window(GridCodec, Arc::clone(&window), close.clone());
        let session = spawn_session(stream, peer, stage, &config, chunk_size, format, live.clone());
        sessions.push(session?);

        let (finished, running): (Vec<_>, Vec<_>) =
            sessions.into_iter().partition(|handle| handle.is_finished());
        finished.into_iter().for_each(join_session);
        sessions = running;
    }

    sessions.into_iter().for_each(join_session);

    // The reporter emits one last window before it notices the flag.
    close.close();
    if let Err(panic) = reporter.join() {
        warn!(panic = panic_message(&*panic), "metrics reporter panicked");
    }
    debug!(connections = accepted, "server stopped");
    Ok(SUCCESS)
}

fn pipeline_config(args: &ServeArgs) -> CliResult<PipelineConfig> {
    let read_timeout = args
        .idle_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    Ok(PipelineConfig {
        frame: FrameConfig {
            max_frame_size: args.max_frame_size,
            read_timeout,
            write_timeout: read_timeout,
        },
        window: parse_duration(&args.window)?,
    })
}

fn spawn_session(
    stream: NetStream,
    peer: SocketAddr,
    stage: ForwardingStage<GridCodec>,
    config: &PipelineConfig,
    chunk_size: usize,
    format: OutputFormat,
    live: LiveConnections,
) -> CliResult<JoinHandle<()>> {
    let frame_config = config.frame.clone();
    std::thread::Builder::new()
        .name(format!("conn-{peer}"))
        .spawn(move || {
            let _tracked = live.guard(peer);
            let peer = peer.to_string();
            let pipeline = Pipeline::from_parts(Reassembler::with_config(&frame_config), stage);
            let mut session = match Session::over_tcp(stream, pipeline, &frame_config, chunk_size)
            {
                Ok(session) => session,
                Err(err) => {
                    warn!(%peer, error = %err, "failed to set up session");
                    return;
                }
            };

            debug!(%peer, "connection accepted");
            match session.run() {
                Ok(summary) => print_session(&peer, &summary, None, format),
                Err(err) => {
                    if err.is_protocol_violation() {
                        warn!(%peer, error = %err, "protocol violation, dropping connection");
                    } else {
                        warn!(%peer, error = %err, "connection ended abnormally");
                    }
                    let message = err.to_string();
                    print_session(&peer, &session.summary(), Some(&message), format);
                }
            }
        })
        .map_err(|err| io_error("failed to spawn connection thread", err))
}

/// Handles to every open connection, so shutdown can unblock their reads.
#[derive(Clone, Default)]
struct LiveConnections(Arc<Mutex<HashMap<SocketAddr, NetStream>>>);

impl LiveConnections {
    fn insert(&self, peer: SocketAddr, stream: NetStream) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer, stream);
    }

    /// Untracks `peer` when dropped, however the session ends.
    fn guard(&self, peer: SocketAddr) -> Untrack {
        Untrack {
            live: self.clone(),
            peer,
        }
    }

    fn shutdown_all(&self) {
        let live = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        for (peer, stream) in live.iter() {
            if let Err(err) = stream.shutdown() {
                debug!(%peer, error = %err, "shutdown failed");
            }
        }
    }
}

struct Untrack {
    live: LiveConnections,
    peer: SocketAddr,
}

impl Drop for Untrack {
    fn drop(&mut self) {
        self.live
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.peer);
    }
}

fn join_session(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("connection").to_string();
    if let Err(panic) = handle.join() {
        warn!(thread = %name, panic = panic_message(&*panic), "connection thread panicked");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Ctrl-C sets the close flag, shuts down every open connection so blocked
/// reads return, then pokes the listener so a blocked `accept` sees the flag.
fn install_ctrlc_handler(
    close: CloseSignal,
    local: SocketAddr,
    live: LiveConnections,
) -> CliResult<()> {
    ctrlc::set_handler(move || {
        close.close();
        live.shutdown_all();
        let _ = TcpTransport::connect(local);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
