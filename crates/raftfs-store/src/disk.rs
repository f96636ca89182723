//! On-disk command execution sink

use crate::commands::{Command, CommandKind, CommandSink, ExecutionResult};
use crate::file::{FileContent, FileTable, StoredFile};
use raftfs_core::{FileId, RaftFsError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Sink writing every file under a server's working folder.
///
/// Files live at `<root>/<file_id>_<basename>`. The id table is rebuilt by
/// replaying the log, so opening a store clears whatever a previous run left.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    table: FileTable,
}

impl FileStore {
    /// Open (and reset) the store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() {
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "opened file store");
        Ok(Self {
            root,
            table: FileTable::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a stored file
    pub fn path_of(&self, id: FileId) -> Option<&Path> {
        match self.table.get(id).map(|f| &f.content) {
            Some(FileContent::OnDisk(path)) => Some(path),
            _ => None,
        }
    }

    /// Read back a stored file
    pub fn read(&self, id: FileId) -> Result<String> {
        let path = self
            .path_of(id)
            .ok_or_else(|| RaftFsError::Storage(format!("file not found: {id}")))?;
        Ok(fs::read_to_string(path)?)
    }

    fn file_path(&self, id: FileId, filename: &str) -> PathBuf {
        let basename = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        self.root.join(format!("{}_{}", id.0, basename))
    }

    fn load(&mut self, filename: &str, content: &str) -> Result<ExecutionResult> {
        let file_id = self.table.next_free_id();
        let path = self.file_path(file_id, filename);
        fs::write(&path, content)?;
        self.table.insert(StoredFile {
            id: file_id,
            filename: filename.to_string(),
            content: FileContent::OnDisk(path),
        });
        Ok(ExecutionResult::Loaded {
            file_id,
            filename: filename.to_string(),
        })
    }

    fn append(&mut self, file_id: FileId, content: &str) -> Result<ExecutionResult> {
        let Some(path) = self.path_of(file_id) else {
            return Ok(ExecutionResult::Failed {
                reason: format!("file not found: {file_id}"),
            });
        };
        let mut file = OpenOptions::new().append(true).open(path)?;
        let len = file.metadata()?.len();
        append_bytes(&mut file, len, content.as_bytes())?;
        Ok(ExecutionResult::Appended { file_id })
    }

    fn delete(&mut self, file_id: FileId) -> Result<ExecutionResult> {
        let Some(path) = self.path_of(file_id).map(Path::to_path_buf) else {
            return Ok(ExecutionResult::Failed {
                reason: format!("file not found: {file_id}"),
            });
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "stored file already gone");
            }
            Err(e) => return Err(e.into()),
        }
        self.table.remove(file_id);
        Ok(ExecutionResult::Deleted { file_id })
    }
}

/// Files that can be cut back to an earlier length
trait Truncate {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append `bytes` to a file of length `len`. On failure the file is cut back
/// to `len` so a retried apply does not write the same bytes twice.
fn append_bytes<F: Write + Truncate>(file: &mut F, len: u64, bytes: &[u8]) -> io::Result<()> {
    let Err(e) = file.write_all(bytes) else {
        return Ok(());
    };
    if let Err(rollback) = file.truncate_to(len) {
        tracing::error!(error = %rollback, "cannot roll back partial append");
    }
    Err(e)
}

impl CommandSink for FileStore {
    fn execute(&mut self, command: &Command) -> Result<ExecutionResult> {
        match &command.kind {
            CommandKind::Load { filename, content } => self.load(filename, content),
            CommandKind::Append { file_id, content } => self.append(*file_id, content),
            CommandKind::Delete { file_id } => self.delete(*file_id),
            CommandKind::List => Ok(ExecutionResult::Listed {
                file_ids: self.table.ids(),
            }),
        }
    }

    fn file_ids(&self) -> Vec<FileId> {
        self.table.ids()
    }
}
