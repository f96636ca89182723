//! Stored file representation and the id table shared by every sink

use raftfs_core::FileId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Content storage mode
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FileContent {
    /// Full content stored in memory
    Loaded(String),

    /// Content stored on disk, path to file
    OnDisk(PathBuf),
}

impl FileContent {
    /// Get content if loaded
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Loaded(s) => Some(s),
            Self::OnDisk(_) => None,
        }
    }
}

/// A file known to a server
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredFile {
    /// Server-assigned identifier
    pub id: FileId,

    /// Name given by the client on `Load`
    pub filename: String,

    /// File content
    pub content: FileContent,
}

/// Files indexed by id.
///
/// Ids are the smallest unused non-negative integer, so replicas applying the
/// same command sequence assign the same ids.
#[derive(Debug, Default)]
pub struct FileTable {
    files: BTreeMap<FileId, StoredFile>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest id not currently in use
    pub fn next_free_id(&self) -> FileId {
        let mut candidate = 0;
        for id in self.files.keys() {
            if id.0 != candidate {
                break;
            }
            candidate += 1;
        }
        FileId::new(candidate)
    }

    pub fn insert(&mut self, file: StoredFile) {
        self.files.insert(file.id, file);
    }

    pub fn get(&self, id: FileId) -> Option<&StoredFile> {
        self.files.get(&id)
    }

    pub fn get_mut(&mut self, id: FileId) -> Option<&mut StoredFile> {
        self.files.get_mut(&id)
    }

    pub fn remove(&mut self, id: FileId) -> Option<StoredFile> {
        self.files.remove(&id)
    }

    /// Ids in ascending order
    pub fn ids(&self) -> Vec<FileId> {
        self.files.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: u64) -> StoredFile {
        StoredFile {
            id: FileId::new(id),
            filename: format!("f{id}"),
            content: FileContent::Loaded(String::new()),
        }
    }

    #[test]
    fn test_next_free_id_fills_holes() {
        let mut table = FileTable::new();
        assert_eq!(table.next_free_id(), FileId::new(0));

        table.insert(file(0));
        table.insert(file(1));
        table.insert(file(2));
        assert_eq!(table.next_free_id(), FileId::new(3));

        table.remove(FileId::new(1));
        assert_eq!(table.next_free_id(), FileId::new(1));
        assert_eq!(table.ids(), vec![FileId::new(0), FileId::new(2)]);
    }
}
