//! Operator console commands
//!
//! The operator drives the cluster by sending control messages to individual
//! processes. Commands are case-insensitive and have single-letter aliases.

use anyhow::{anyhow, Result};
use raftfs_core::{ProcessId, Speed};
use raftfs_raft::Message;

pub const HELP: &str = "\
Commands (case-insensitive):
  CRASH <id>             (c)  stop a process; it keeps answering control messages
  SPEED <id> <level>     (p)  set the speed of a process: low, medium or fast
  START <id>             (g)  start a process (clients only send once started)
  RECOVER <id>           (r)  bring a crashed process back
  STATUS                 (s)  show every server and client
  HELP                   (h)  show this help
  EXIT                   (e)  stop the cluster";

/// A line entered at the operator console
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperatorCommand {
    Crash(ProcessId),
    Speed(ProcessId, Speed),
    Start(ProcessId),
    Recover(ProcessId),
    Status,
    Help,
    Exit,
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = parts.first() else {
            return Err(anyhow!("empty command"));
        };

        let cmd = first.to_uppercase();
        let normalized = match cmd.as_str() {
            "C" => "CRASH",
            "P" => "SPEED",
            "G" => "START",
            "R" => "RECOVER",
            "S" => "STATUS",
            "H" => "HELP",
            "E" | "Q" | "QUIT" => "EXIT",
            other => other,
        };

        match (normalized, &parts[1..]) {
            ("STATUS", []) => Ok(Self::Status),
            ("HELP", []) => Ok(Self::Help),
            ("EXIT", []) => Ok(Self::Exit),
            ("CRASH", [id]) => Ok(Self::Crash(parse_id(id)?)),
            ("START", [id]) => Ok(Self::Start(parse_id(id)?)),
            ("RECOVER", [id]) => Ok(Self::Recover(parse_id(id)?)),
            ("SPEED", [id, level]) => {
                let speed = level.parse::<Speed>().map_err(|e| anyhow!(e))?;
                Ok(Self::Speed(parse_id(id)?, speed))
            }
            ("CRASH" | "START" | "RECOVER", _) => {
                Err(anyhow!("{normalized} requires exactly one argument: {normalized} <id>"))
            }
            ("SPEED", _) => Err(anyhow!("SPEED requires two arguments: SPEED <id> <low|medium|fast>")),
            ("STATUS" | "HELP" | "EXIT", _) => Err(anyhow!("{normalized} takes no argument")),
            _ => Err(anyhow!("invalid command, type HELP for the list of commands")),
        }
    }

    /// Target and control message, for commands addressed to a process
    pub fn control(&self) -> Option<(ProcessId, Message)> {
        match self {
            Self::Crash(id) => Some((*id, Message::Crash)),
            Self::Speed(id, speed) => Some((*id, Message::SetSpeed { speed: *speed })),
            Self::Start(id) => Some((*id, Message::Start)),
            Self::Recover(id) => Some((*id, Message::Recover)),
            Self::Status | Self::Help | Self::Exit => None,
        }
    }
}

fn parse_id(raw: &str) -> Result<ProcessId> {
    let id = raw
        .parse::<u64>()
        .map_err(|_| anyhow!("invalid process id: {raw}"))?;
    if id == ProcessId::OPERATOR.0 {
        return Err(anyhow!("process 0 is the operator console"));
    }
    Ok(ProcessId::new(id))
}
