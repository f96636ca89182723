//! In-memory command execution sink

use crate::commands::{Command, CommandKind, CommandSink, ExecutionResult};
use crate::file::{FileContent, FileTable, StoredFile};
use raftfs_core::{FileId, Result};

/// Sink keeping every file in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: FileTable,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get file content
    pub fn content(&self, id: FileId) -> Option<&str> {
        self.table.get(id).and_then(|f| f.content.as_str())
    }

    /// Get the name a file was loaded under
    pub fn filename(&self, id: FileId) -> Option<&str> {
        self.table.get(id).map(|f| f.filename.as_str())
    }

    pub fn file_count(&self) -> usize {
        self.table.len()
    }
}

impl CommandSink for MemoryStore {
    fn execute(&mut self, command: &Command) -> Result<ExecutionResult> {
        let result = match &command.kind {
            CommandKind::Load { filename, content } => {
                let file_id = self.table.next_free_id();
                self.table.insert(StoredFile {
                    id: file_id,
                    filename: filename.clone(),
                    content: FileContent::Loaded(content.clone()),
                });
                ExecutionResult::Loaded {
                    file_id,
                    filename: filename.clone(),
                }
            }
            CommandKind::Append { file_id, content } => match self.table.get_mut(*file_id) {
                Some(StoredFile {
                    content: FileContent::Loaded(existing),
                    ..
                }) => {
                    existing.push_str(content);
                    ExecutionResult::Appended { file_id: *file_id }
                }
                _ => ExecutionResult::Failed {
                    reason: format!("file not found: {file_id}"),
                },
            },
            CommandKind::Delete { file_id } => match self.table.remove(*file_id) {
                Some(_) => ExecutionResult::Deleted { file_id: *file_id },
                None => ExecutionResult::Failed {
                    reason: format!("file not found: {file_id}"),
                },
            },
            CommandKind::List => ExecutionResult::Listed {
                file_ids: self.table.ids(),
            },
        };
        Ok(result)
    }

    fn file_ids(&self) -> Vec<FileId> {
        self.table.ids()
    }
}
