//! Stable storage for the Raft persistent state
//!
//! `{current_term, voted_for, log}` must survive a crash. Two backends:
//! - `MemoryStateStorage`: kept in process memory, for tests and the in-memory store backend
//! - `FileStateStorage`: one JSON document, replaced atomically on every save

use crate::log::ReplicatedLog;
use raftfs_core::{ProcessId, RaftFsError, Result, Term};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// State a server must persist before answering RPCs
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    /// Latest term the server has seen
    pub current_term: Term,

    /// Candidate that received this server's vote in `current_term`
    pub voted_for: Option<ProcessId>,

    /// Log entries
    pub log: ReplicatedLog,
}

/// Backend holding the persistent state
pub trait StateStorage: Send {
    /// Last saved state, `None` if nothing was ever saved
    fn load(&self) -> Result<Option<PersistentState>>;

    /// Durably replace the saved state
    fn save(&mut self, state: &PersistentState) -> Result<()>;
}

/// In-memory state storage
#[derive(Debug, Default)]
pub struct MemoryStateStorage {
    saved: Option<PersistentState>,
}

impl MemoryStateStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStorage for MemoryStateStorage {
    fn load(&self) -> Result<Option<PersistentState>> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, state: &PersistentState) -> Result<()> {
        self.saved = Some(state.clone());
        Ok(())
    }
}

/// JSON file state storage
#[derive(Debug)]
pub struct FileStateStorage {
    path: PathBuf,
}

impl FileStateStorage {
    /// File name used inside a server's working folder
    pub const FILE_NAME: &'static str = "raft-state.json";

    /// Storage at `<dir>/raft-state.json`, creating `dir` if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(Self::FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Make the rename itself durable
    #[cfg(unix)]
    fn sync_dir(&self) -> Result<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all()?,
            _ => File::open(".")?.sync_all()?,
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> Result<()> {
        Ok(())
    }
}

impl StateStorage for FileStateStorage {
    fn load(&self) -> Result<Option<PersistentState>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_slice(&data).map_err(|e| {
            RaftFsError::Storage(format!("corrupt state file {}: {}", self.path.display(), e))
        })?;
        Ok(Some(state))
    }

    /// Write to a temp file, fsync, rename over the state file, then fsync the folder
    fn save(&mut self, state: &PersistentState) -> Result<()> {
        let data = serde_json::to_vec(state)?;
        let tmp = self.temp_path();

        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        self.sync_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogEntry;
    use raftfs_store::{Command, CommandKind};
    use tempfile::TempDir;

    fn sample_state() -> PersistentState {
        let mut log = ReplicatedLog::new();
        log.push(LogEntry::new(
            2,
            Command::new(ProcessId::new(5), 1, CommandKind::List),
        ));
        PersistentState {
            current_term: 3,
            voted_for: Some(ProcessId::new(2)),
            log,
        }
    }

    #[test]
    fn test_memory_storage() {
        let mut storage = MemoryStateStorage::new();
        assert!(storage.load().unwrap().is_none());
        storage.save(&sample_state()).unwrap();
        assert_eq!(storage.load().unwrap(), Some(sample_state()));
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut storage = FileStateStorage::open(temp_dir.path().join("server-1")).unwrap();
            assert!(storage.load().unwrap().is_none());
            storage.save(&PersistentState::default()).unwrap();
            storage.save(&sample_state()).unwrap();
        }

        let storage = FileStateStorage::open(temp_dir.path().join("server-1")).unwrap();
        assert_eq!(storage.load().unwrap(), Some(sample_state()));
        assert!(!storage.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_save_keeps_previous_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut storage = FileStateStorage::open(temp_dir.path()).unwrap();
        storage.save(&sample_state()).unwrap();

        // The temp file cannot be created over a directory
        fs::create_dir(storage.temp_path()).unwrap();
        assert!(storage.save(&PersistentState::default()).is_err());
        assert_eq!(storage.load().unwrap(), Some(sample_state()));
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStateStorage::open(temp_dir.path()).unwrap();
        fs::write(storage.path(), b"{ not json").unwrap();
        assert!(matches!(storage.load(), Err(RaftFsError::Storage(_))));
    }
}
