//! Tracing setup: a stdout layer plus a rolling daemon log file under
//! `$XDG_DATA_HOME/localport/logs/daemon.log`, both filtered by `RUST_LOG`/`LOCALPORT_LOG`.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::PrettyFields;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("initializing tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env("LOCALPORT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initializes stdout-only logging — used by the `localport` CLI, which has no daemon
/// log file of its own and shouldn't write one.
pub fn init_stdout() -> Result<(), TracingError> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .fmt_fields(PrettyFields::new())
        .with_filter(filter());

    Registry::default().with(layer).try_init()?;
    Ok(())
}

/// Initializes stdout plus a non-blocking daemon log file. The returned [`WorkerGuard`]
/// must be kept alive for the process lifetime — dropping it stops the background
/// flusher thread, silently truncating the tail of the log.
pub fn init_daemon(log_dir: &Path) -> Result<WorkerGuard, TracingError> {
    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::never(log_dir, "daemon.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .fmt_fields(PrettyFields::new())
        .with_filter(filter());

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .fmt_fields(PrettyFields::new())
        .with_filter(filter());

    Registry::default().with(stdout_layer).with(file_layer).try_init()?;
    Ok(guard)
}
