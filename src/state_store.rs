//! `PersistedState` (`spec.md` §3, §6): the `{id → pid, start time, fingerprint}` map,
//! rewritten atomically after every start/stop.

use crate::adapters::fingerprint;
use crate::config::service::Technology;
use crate::fs::{atomic_write, FileRenamer, FileWriter};
use crate::identity::ServiceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub service_id: ServiceId,
    pub pid: u32,
    pub technology: Technology,
    pub local_port: u16,
    pub started_at: SystemTime,
    pub command_argv_fingerprint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub entries: HashMap<ServiceId, PersistedEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("reading `{0}`: {1}")]
    Read(String, std::io::Error),
    #[error("parsing `{0}`: {1}")]
    Parse(String, serde_json::Error),
    #[error("serializing state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Fs(#[from] crate::fs::FsError),
}

impl PersistedState {
    /// Returns an empty state if `path` does not exist yet — a fresh daemon has
    /// nothing to reconcile against.
    pub fn load(path: &Path) -> Result<Self, StateStoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|err| StateStoreError::Read(path.display().to_string(), err))?;
        serde_json::from_str(&raw).map_err(|err| StateStoreError::Parse(path.display().to_string(), err))
    }

    pub fn save(
        &self,
        writer: &impl FileWriter,
        renamer: &impl FileRenamer,
        path: &Path,
    ) -> Result<(), StateStoreError> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(writer, renamer, path, &json)?;
        Ok(())
    }

    pub fn upsert(&mut self, entry: PersistedEntry) {
        self.entries.insert(entry.service_id, entry);
    }

    pub fn remove(&mut self, id: ServiceId) {
        self.entries.remove(&id);
    }

    pub fn get(&self, id: ServiceId) -> Option<&PersistedEntry> {
        self.entries.get(&id)
    }
}

/// Default path: `$XDG_DATA_HOME/localport/state.json`.
pub fn default_state_path() -> PathBuf {
    data_dir().join("state.json")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("localport")
}

pub fn make_entry(
    service_id: ServiceId,
    pid: u32,
    technology: Technology,
    local_port: u16,
    started_at: SystemTime,
    argv: &[String],
) -> PersistedEntry {
    PersistedEntry {
        service_id,
        pid,
        technology,
        local_port,
        started_at,
        command_argv_fingerprint: fingerprint::fingerprint(argv),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFile;

    fn id() -> ServiceId {
        ServiceId::from_definition(&crate::config::service::ServiceDefinition {
            name: "db".to_string(),
            technology: Technology::Kubernetes,
            local_port: 5432,
            remote_port: 5432,
            connection: crate::config::service::ConnectionSpec::Kubernetes {
                kind: "service".to_string(),
                name: "postgres".to_string(),
                namespace: None,
                context: None,
            },
            tags: vec![],
            description: None,
            enabled: true,
            health_check: crate::config::health_check::HealthCheckSpec::default(),
            restart_policy: crate::config::restart_policy::RestartPolicyConfig::default(),
        })
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = PersistedState::load(&dir.path().join("state.json")).unwrap();
        assert!(state.entries.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = PersistedState::default();
        state.upsert(make_entry(
            id(),
            1234,
            Technology::Kubernetes,
            5432,
            SystemTime::now(),
            &["kubectl".to_string(), "port-forward".to_string()],
        ));
        state.save(&LocalFile, &LocalFile, &path).unwrap();

        let loaded = PersistedState::load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn remove_drops_entry() {
        let mut state = PersistedState::default();
        let service_id = id();
        state.upsert(make_entry(
            service_id,
            1,
            Technology::Kubernetes,
            5432,
            SystemTime::now(),
            &[],
        ));
        state.remove(service_id);
        assert!(state.get(service_id).is_none());
    }
}
