//! Command-line argument definitions (`spec.md` §6), shared by both binaries.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Arguments for the `localportd` daemon binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct DaemonArgs {
    /// Path to the service config file.
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Run in the foreground instead of detaching (still logs to the daemon log file).
    #[arg(long)]
    pub foreground: bool,

    /// Overrides the default `$XDG_DATA_HOME/localport` data directory.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Overrides the default control socket path.
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

/// Arguments for the `localport` control CLI binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ClientArgs {
    #[command(subcommand)]
    pub command: ClientCommand,

    /// Overrides the default control socket path.
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Start one or more configured services (all, if none are named).
    Start { names: Vec<String> },
    /// Stop one or more running services (all, if none are named).
    Stop { names: Vec<String> },
    /// Print the live status table.
    Status { names: Vec<String> },
    /// Reload the daemon's config and reconcile running services against it.
    Reload,
    /// Ask the daemon to shut down cleanly.
    DaemonStop,
    /// Print the tail of a service's log.
    Logs {
        name: String,
        #[arg(long, short = 'n', default_value_t = 100)]
        lines: usize,
    },
}
