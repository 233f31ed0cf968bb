//! Subprocess adapter layer (`spec.md` §4.2): technology-specific spawners that
//! build argv, detach the child into its own session, and redirect its output
//! directly into the service log file — no pipe is retained in the parent, since
//! retaining one was observed to prevent detachment (`spec.md` §9).

pub mod fingerprint;
pub mod kubernetes;
pub mod shutdown;
pub mod ssh;

use crate::config::service::{ConnectionSpec, ServiceDefinition};
use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Child, Command, Stdio};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("forwarder binary `{0}` not found on PATH")]
    BinaryNotFound(String),
    #[error("opening log file `{0}`: {1}")]
    LogFile(String, std::io::Error),
    #[error("spawning child: {0}")]
    Spawn(#[from] std::io::Error),
}

pub struct SpawnedProcess {
    pub pid: u32,
    pub argv_fingerprint: String,
}

/// `spawn(ServiceDefinition, log_sink) -> {pid, ..}` contract from `spec.md` §4.2,
/// dispatched to the technology-specific builder.
pub fn spawn(def: &ServiceDefinition, log_path: &Path) -> Result<SpawnedProcess, AdapterError> {
    let (binary, argv) = build_argv(def)?;
    spawn_detached(&binary, &argv, log_path)
}

fn build_argv(def: &ServiceDefinition) -> Result<(String, Vec<String>), AdapterError> {
    match &def.connection {
        ConnectionSpec::Kubernetes { .. } => kubernetes::build_argv(def),
        ConnectionSpec::Ssh { .. } => ssh::build_argv(def),
    }
}

/// The argv fingerprint `spawn` would produce for `def`, without spawning anything —
/// used at boot to decide whether a PID recorded in `PersistedState` still matches
/// what this configuration would launch (`spec.md` §4.8 startup reconciliation).
pub fn expected_argv_fingerprint(def: &ServiceDefinition) -> Result<String, AdapterError> {
    let (binary, argv) = build_argv(def)?;
    let mut full_argv = vec![binary];
    full_argv.extend(argv);
    Ok(fingerprint::fingerprint(&full_argv))
}

/// Shared spawn discipline: resolve the binary on PATH, open the log file in
/// append mode, redirect stdin/stdout/stderr to it, start the child in a new
/// session so it survives the parent, then drop our handle to the file — only
/// the PID is retained (`spec.md` §4.2, §9).
fn spawn_detached(binary: &str, argv: &[String], log_path: &Path) -> Result<SpawnedProcess, AdapterError> {
    if which(binary).is_none() {
        return Err(AdapterError::BinaryNotFound(binary.to_string()));
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|err| AdapterError::LogFile(log_path.display().to_string(), err))?;
    let stdout_file = log_file
        .try_clone()
        .map_err(|err| AdapterError::LogFile(log_path.display().to_string(), err))?;
    let stderr_file = log_file
        .try_clone()
        .map_err(|err| AdapterError::LogFile(log_path.display().to_string(), err))?;

    let mut command = Command::new(binary);
    command
        .args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file));

    detach_into_new_session(&mut command);

    let child: Child = command.spawn()?;
    let pid = child.id();
    // We don't wait() here — the supervisor reaps via its own process table, and
    // retaining no handle at all (beyond the pid) is what lets a bare `start`
    // outlive this process if it's ever invoked outside the daemon.
    std::mem::forget(child);

    let mut full_argv = vec![binary.to_string()];
    full_argv.extend_from_slice(argv);

    Ok(SpawnedProcess {
        pid,
        argv_fingerprint: fingerprint::fingerprint(&full_argv),
    })
}

#[cfg(unix)]
fn detach_into_new_session(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    // Safety: setsid() is async-signal-safe and the only call made between fork
    // and exec here.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map_err(|err| std::io::Error::from_raw_os_error(err as i32))?;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn detach_into_new_session(_command: &mut Command) {}

fn which(binary: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
