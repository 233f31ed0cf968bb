//! Entry point for the `localportd` supervisor daemon.

use clap::Parser;
use localport::cli::DaemonArgs;
use localport::state_store;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = DaemonArgs::parse();
    let data_dir = args.data_dir.clone().unwrap_or_else(state_store::data_dir);
    let log_dir = data_dir.join("logs");

    let _tracing_guard = match localport::instrumentation::init_daemon(&log_dir) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("failed to initialize logging: {err}");
            None
        }
    };

    localport::daemon::run(args)
}
