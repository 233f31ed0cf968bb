//! Service Log Manager (`spec.md` §4.3): one append-only file per running service,
//! rotated by size on flush, retained by age and count.

use crate::config::defaults::{LOG_RETENTION, LOG_RETENTION_COUNT, LOG_ROTATION_SIZE_BYTES};
use crate::fs::{DirLister, FileDeleter, FileRenamer};
use crate::identity::ServiceId;
use std::fs::{File, Metadata, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, thiserror::Error)]
pub enum ServiceLogError {
    #[error("opening `{0}`: {1}")]
    Open(String, std::io::Error),
    #[error("writing header: {0}")]
    Header(std::io::Error),
    #[error(transparent)]
    Fs(#[from] crate::fs::FsError),
}

/// Per-service log path: `$XDG_DATA_HOME/localport/logs/services/<name>_<short-id>.log`.
pub fn service_log_path(base_dir: &Path, service_name: &str, id: ServiceId) -> PathBuf {
    base_dir
        .join("logs")
        .join("services")
        .join(format!("{service_name}_{}.log", id.short()))
}

/// One open, append-mode writer for a service's current epoch. Rotation is
/// triggered on [`Self::maybe_rotate`], checked by the caller after each flush —
/// `spec.md` §4.3 "checked on writer flush".
pub struct ServiceLog {
    path: PathBuf,
    file: File,
}

impl ServiceLog {
    /// Opens (creating parent directories and the file if needed) and writes a
    /// structured epoch header (`spec.md` §4.3).
    pub fn open_epoch(
        path: PathBuf,
        id: ServiceId,
        pid: u32,
        local_port: u16,
        remote_port: u16,
        technology: &str,
        connection_summary: &str,
    ) -> Result<Self, ServiceLogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| ServiceLogError::Open(path.display().to_string(), err))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| ServiceLogError::Open(path.display().to_string(), err))?;

        let header = format!(
            "=== epoch start: id={id} pid={pid} local_port={local_port} remote_port={remote_port} \
             technology={technology} connection={connection_summary} platform={} \
             daemon_version={} timestamp={} ===\n",
            std::env::consts::OS,
            env!("CARGO_PKG_VERSION"),
            rfc3339(SystemTime::now()),
        );
        file.write_all(header.as_bytes()).map_err(ServiceLogError::Header)?;

        Ok(Self { path, file })
    }

    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }

    fn metadata(&self) -> std::io::Result<Metadata> {
        self.file.metadata()
    }

    /// Renames the current file to `.1` (shifting existing numbered files up) and
    /// reopens a fresh file at `self.path`, if size has crossed the threshold.
    pub fn maybe_rotate(
        &mut self,
        renamer: &impl FileRenamer,
        rotation_threshold: u64,
    ) -> Result<bool, ServiceLogError> {
        let size = self.metadata().map_err(|err| ServiceLogError::Open(self.path.display().to_string(), err))?.len();
        if size < rotation_threshold {
            return Ok(false);
        }

        shift_rotated_files(&self.path, renamer)?;
        let rotated_path = self.path.with_extension("log.1");
        renamer.rename(&self.path, &rotated_path)?;

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| ServiceLogError::Open(self.path.display().to_string(), err))?;
        Ok(true)
    }
}

fn shift_rotated_files(path: &Path, renamer: &impl FileRenamer) -> Result<(), ServiceLogError> {
    for index in (1..LOG_RETENTION_COUNT).rev() {
        let from = path.with_extension(format!("log.{index}"));
        let to = path.with_extension(format!("log.{}", index + 1));
        if from.exists() {
            let _ = renamer.rename(&from, &to);
        }
    }
    Ok(())
}

/// Deletes rotated files older than [`LOG_RETENTION`] or beyond [`LOG_RETENTION_COUNT`].
pub fn sweep_retention(
    dir: &Path,
    lister: &impl DirLister,
    deleter: &impl FileDeleter,
    now: SystemTime,
) -> Result<(), crate::fs::FsError> {
    let mut rotated: Vec<PathBuf> = lister
        .dir_entries(dir)?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|ext| ext.to_string_lossy().parse::<u32>().is_ok()))
        .collect();
    rotated.sort();

    for path in rotated.iter().rev().skip(LOG_RETENTION_COUNT) {
        deleter.delete(path)?;
    }

    for path in &rotated {
        if let Ok(metadata) = std::fs::metadata(path) {
            if let Ok(modified) = metadata.modified() {
                if now.duration_since(modified).unwrap_or_default() > LOG_RETENTION {
                    deleter.delete(path)?;
                }
            }
        }
    }
    Ok(())
}

fn rfc3339(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339()
}

pub const DEFAULT_ROTATION_THRESHOLD: u64 = LOG_ROTATION_SIZE_BYTES;
