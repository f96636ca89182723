//! Commands replicated through the Raft log and their execution results

use raftfs_core::{CommandId, FileId, ProcessId, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation requested by a client
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Store a new file, the servers assign its id
    Load { filename: String, content: String },

    /// Append content to an existing file
    Append { file_id: FileId, content: String },

    /// Remove a file
    Delete { file_id: FileId },

    /// List the ids of every stored file
    List,
}

/// A client command as stored in the log.
///
/// `(client_id, command_id)` identifies the command for de-duplication.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub client_id: ProcessId,
    pub command_id: CommandId,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(client_id: ProcessId, command_id: CommandId, kind: CommandKind) -> Self {
        Self {
            client_id,
            command_id,
            kind,
        }
    }

    /// Check whether this is the same client request as `(client_id, command_id)`
    pub fn is_request(&self, client_id: ProcessId, command_id: CommandId) -> bool {
        self.client_id == client_id && self.command_id == command_id
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CommandKind::Load { filename, .. } => write!(f, "LOAD {filename}")?,
            CommandKind::Append { file_id, .. } => write!(f, "APPEND {file_id}")?,
            CommandKind::Delete { file_id } => write!(f, "DELETE {file_id}")?,
            CommandKind::List => write!(f, "LIST")?,
        }
        write!(f, " (client {}, command {})", self.client_id, self.command_id)
    }
}

/// Outcome of applying a command to the local file state
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// File stored under a freshly assigned id
    Loaded { file_id: FileId, filename: String },

    Appended { file_id: FileId },

    Deleted { file_id: FileId },

    /// Ids of every stored file, in ascending order
    Listed { file_ids: Vec<FileId> },

    /// The command was applied but had no effect (e.g. unknown file id).
    /// Every replica reaches the same verdict.
    Failed { reason: String },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Applies committed commands to local file state.
///
/// `Err` is reserved for local I/O failures; the caller must retry the same
/// command before moving on to the next one.
pub trait CommandSink: Send {
    fn execute(&mut self, command: &Command) -> Result<ExecutionResult>;

    /// Ids of the files currently stored
    fn file_ids(&self) -> Vec<FileId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json_shape() {
        let command = Command::new(
            ProcessId::new(7),
            1,
            CommandKind::Load {
                filename: "a.txt".to_string(),
                content: "hi".to_string(),
            },
        );
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["kind"]["type"], "LOAD");
        assert_eq!(json["client_id"], 7);

        let back: Command = serde_json::from_value(json).unwrap();
        assert_eq!(back, command);
        assert!(back.is_request(ProcessId::new(7), 1));
        assert!(!back.is_request(ProcessId::new(7), 2));
    }

    #[test]
    fn test_display() {
        let command = Command::new(ProcessId::new(5), 3, CommandKind::Delete { file_id: FileId::new(2) });
        assert_eq!(command.to_string(), "DELETE 2 (client 5, command 3)");
    }
}
