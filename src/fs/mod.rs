//! Small filesystem abstraction used by the persisted-state store and the service log
//! manager, so both can be exercised in tests without touching real disk.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("error creating file: `{0}`")]
    Create(#[from] io::Error),
    #[error("error renaming `{0}` to `{1}`: `{2}`")]
    Rename(String, String, io::Error),
    #[error("`{0}` not found")]
    NotFound(String),
}

pub trait FileWriter {
    fn write(&self, path: &Path, content: &str) -> Result<(), FsError>;
}

pub trait FileRenamer {
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;
}

pub trait FileDeleter {
    fn delete(&self, path: &Path) -> Result<(), FsError>;
}

pub trait DirLister {
    fn dir_entries(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError>;
}

/// The real, disk-backed implementation of the traits above.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFile;

impl FileWriter for LocalFile {
    fn write(&self, path: &Path, content: &str) -> Result<(), FsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl FileRenamer for LocalFile {
    fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        if !from.exists() {
            return Err(FsError::NotFound(from.display().to_string()));
        }
        std::fs::rename(from, to)
            .map_err(|err| FsError::Rename(from.display().to_string(), to.display().to_string(), err))
    }
}

impl FileDeleter for LocalFile {
    fn delete(&self, path: &Path) -> Result<(), FsError> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_file(path)?;
        Ok(())
    }
}

impl DirLister for LocalFile {
    fn dir_entries(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        Ok(entries)
    }
}

/// Atomically writes `content` to `path` by writing a sibling temp file and renaming it
/// over the destination — the rename law in `spec.md` §8 property 6.
pub fn atomic_write(
    writer: &impl FileWriter,
    renamer: &impl FileRenamer,
    path: &Path,
    content: &str,
) -> Result<(), FsError> {
    let tmp_path = path.with_extension("tmp");
    writer.write(&tmp_path, content)?;
    renamer.rename(&tmp_path, path)
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub LocalFile {}

        impl FileWriter for LocalFile {
            fn write(&self, path: &Path, content: &str) -> Result<(), FsError>;
        }
        impl FileRenamer for LocalFile {
            fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError>;
        }
        impl FileDeleter for LocalFile {
            fn delete(&self, path: &Path) -> Result<(), FsError>;
        }
        impl DirLister for LocalFile {
            fn dir_entries(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError>;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_renames_temp_over_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        atomic_write(&LocalFile, &LocalFile, &path, "{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(!path.with_extension("tmp").exists());

        atomic_write(&LocalFile, &LocalFile, &path, "{\"a\":1}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn rename_missing_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFile
            .rename(&dir.path().join("missing"), &dir.path().join("dst"))
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }
}
