//! Error types for RaftFS

use crate::types::{LogIndex, ProcessId};
use thiserror::Error;

/// Main error type for RaftFS
#[derive(Error, Debug)]
pub enum RaftFsError {
    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(String),

    // Raft errors
    #[error("log index {index} out of range (last index is {last_index})")]
    OutOfRange { index: LogIndex, last_index: LogIndex },

    #[error("unknown process: {0}")]
    UnknownProcess(ProcessId),

    // Network errors
    #[error("cannot deliver to {target}: {reason}")]
    Transport { target: ProcessId, reason: String },

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RaftFsError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Storage(_) | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for RaftFsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for RaftFS
pub type Result<T> = std::result::Result<T, RaftFsError>;
