//! Core types for RaftFS

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Election epoch counter
pub type Term = u64;

/// Position in the replicated log (0 is the sentinel entry)
pub type LogIndex = u64;

/// Per-client command sequence number, used for de-duplication
pub type CommandId = u64;

/// Identifier of a process on the message bus.
///
/// `0` is the operator console, `1..=nb_servers` are Raft servers and every
/// id above that is a client.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

impl ProcessId {
    /// The operator console
    pub const OPERATOR: Self = Self(0);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Check whether this id designates one of the `nb_servers` servers
    pub fn is_server(&self, nb_servers: u64) -> bool {
        self.0 >= 1 && self.0 <= nb_servers
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned file identifier
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FileId(pub u64);

impl FileId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Simulated processing speed of a process, set by the operator
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    #[default]
    Fast,
    Medium,
    Low,
}

impl Speed {
    /// Extra pause inserted in every loop iteration of a process
    pub fn delay(&self) -> Duration {
        match self {
            Self::Fast => Duration::ZERO,
            Self::Medium => Duration::from_millis(20),
            Self::Low => Duration::from_millis(100),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Speed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" | "high" => Ok(Self::Fast),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown speed: {other}")),
        }
    }
}
