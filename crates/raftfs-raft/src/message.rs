//! Wire messages exchanged between RaftFS processes
//!
//! Every message travels inside an [`Envelope`] carrying the sender and the
//! target. The encoding is JSON with an explicit `type` tag; decoding an
//! unknown tag or a malformed body fails as a whole with
//! [`RaftFsError::Protocol`].

use crate::log::LogEntry;
use raftfs_core::{CommandId, LogIndex, ProcessId, RaftFsError, Result, Speed, Term};
use raftfs_store::{Command, ExecutionResult};
use serde::{Deserialize, Serialize};

/// RequestVote RPC arguments
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestVote {
    /// Candidate's term
    pub term: Term,
    /// Candidate requesting the vote
    pub candidate_id: ProcessId,
    /// Index of the candidate's last log entry
    pub last_log_index: LogIndex,
    /// Term of the candidate's last log entry
    pub last_log_term: Term,
}

/// RequestVote RPC results
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

/// AppendEntries RPC arguments (empty `entries` for a heartbeat)
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AppendEntries {
    pub term: Term,
    pub leader_id: ProcessId,
    /// Index of the entry immediately preceding the new ones
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

/// AppendEntries RPC results
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
    /// Highest index known to match the leader's log (meaningful on success)
    pub match_index: LogIndex,
}

/// Process-control message kinds issued by the operator
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Crash,
    SetSpeed,
    Start,
    Recover,
}

/// Every message a process can receive
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // Consensus traffic
    RequestVote(RequestVote),
    RequestVoteResponse(RequestVoteResponse),
    AppendEntries(AppendEntries),
    AppendEntriesResponse(AppendEntriesResponse),

    // Client traffic
    ClientRequest { command: Command },
    /// Tells a misdirected client who the leader is believed to be
    LeaderRedirect { leader_id: Option<ProcessId> },
    /// Result of an applied command, sent by the leader to the client
    CommandResult {
        command_id: CommandId,
        result: ExecutionResult,
    },

    // Process control
    Crash,
    SetSpeed { speed: Speed },
    Start,
    Recover,
    Ack { control: ControlKind },
}

impl Message {
    /// Kind of control message, `None` for every other message
    pub fn control_kind(&self) -> Option<ControlKind> {
        match self {
            Self::Crash => Some(ControlKind::Crash),
            Self::SetSpeed { .. } => Some(ControlKind::SetSpeed),
            Self::Start => Some(ControlKind::Start),
            Self::Recover => Some(ControlKind::Recover),
            _ => None,
        }
    }

    /// Term carried by consensus messages
    pub fn term(&self) -> Option<Term> {
        match self {
            Self::RequestVote(m) => Some(m.term),
            Self::RequestVoteResponse(m) => Some(m.term),
            Self::AppendEntries(m) => Some(m.term),
            Self::AppendEntriesResponse(m) => Some(m.term),
            _ => None,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestVote(_) => "RequestVote",
            Self::RequestVoteResponse(_) => "RequestVoteResponse",
            Self::AppendEntries(_) => "AppendEntries",
            Self::AppendEntriesResponse(_) => "AppendEntriesResponse",
            Self::ClientRequest { .. } => "ClientRequest",
            Self::LeaderRedirect { .. } => "LeaderRedirect",
            Self::CommandResult { .. } => "CommandResult",
            Self::Crash => "Crash",
            Self::SetSpeed { .. } => "SetSpeed",
            Self::Start => "Start",
            Self::Recover => "Recover",
            Self::Ack { .. } => "Ack",
        }
    }
}

/// An addressed message
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: ProcessId,
    pub target: ProcessId,
    pub message: Message,
}

impl Envelope {
    pub fn new(sender: ProcessId, target: ProcessId, message: Message) -> Self {
        Self {
            sender,
            target,
            message,
        }
    }

    /// Encode to bytes for the transport
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| RaftFsError::Serialization(e.to_string()))
    }

    /// Decode bytes received from the transport
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| RaftFsError::Protocol(e.to_string()))
    }
}
