//! Client driver
//!
//! A client replays its script one command at a time: it waits for `Start`,
//! sends the current command to the server it believes is the leader, follows
//! `LeaderRedirect`s, and retries against a random server when no answer
//! comes back within `request_timeout`.

use crate::script::ClientOp;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raftfs_core::{ClientConfig, CommandId, FileId, ProcessId, Speed};
use raftfs_raft::{ControlKind, Envelope, Message, Process};
use raftfs_store::{Command, CommandKind, ExecutionResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

/// Progress of a client, for operators
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub id: ProcessId,
    pub started: bool,
    pub crashed: bool,
    pub speed: Speed,
    /// Results received so far, in command order
    pub results: Vec<(CommandId, ExecutionResult)>,
    /// Commands not yet answered, including the one in flight
    pub remaining: usize,
}

impl ClientStatus {
    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.crashed {
            "crashed"
        } else if !self.started {
            "waiting"
        } else if self.is_finished() {
            "done"
        } else {
            "running"
        };
        write!(
            f,
            "client {:<3} {:<9} done {:<4} remaining {:<4} speed {}",
            self.id,
            state,
            self.results.len(),
            self.remaining,
            self.speed
        )
    }
}

/// A client process replaying a command script
pub struct ClientSession {
    id: ProcessId,
    nb_servers: u64,
    request_timeout: Duration,
    rng: StdRng,

    ops: VecDeque<ClientOp>,
    next_command_id: CommandId,
    current: Option<Command>,
    target: ProcessId,
    /// Deadline of the request in flight
    deadline: Option<Instant>,

    file_ids: HashMap<String, FileId>,
    results: Vec<(CommandId, ExecutionResult)>,

    started: bool,
    crashed: bool,
    speed: Speed,
}

impl ClientSession {
    pub fn new(
        id: ProcessId,
        nb_servers: u64,
        ops: Vec<ClientOp>,
        config: &ClientConfig,
        rng_seed: Option<u64>,
    ) -> Self {
        let mut rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ id.0),
            None => StdRng::from_entropy(),
        };
        let target = ProcessId::new(rng.gen_range(1..=nb_servers.max(1)));
        Self {
            id,
            nb_servers,
            request_timeout: config.request_timeout,
            rng,
            ops: ops.into(),
            next_command_id: 1,
            current: None,
            target,
            deadline: None,
            file_ids: HashMap::new(),
            results: Vec::new(),
            started: false,
            crashed: false,
            speed: Speed::default(),
        }
    }

    pub fn results(&self) -> &[(CommandId, ExecutionResult)] {
        &self.results
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none() && self.ops.is_empty()
    }

    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            id: self.id,
            started: self.started,
            crashed: self.crashed,
            speed: self.speed,
            results: self.results.clone(),
            remaining: self.ops.len() + usize::from(self.current.is_some()),
        }
    }

    fn random_server(&mut self) -> ProcessId {
        ProcessId::new(self.rng.gen_range(1..=self.nb_servers.max(1)))
    }

    /// Turn the next script operation into a command, resolving file names
    fn next_command(&mut self) -> Option<Command> {
        while let Some(op) = self.ops.pop_front() {
            let kind = match op {
                ClientOp::Load { filename, content } => CommandKind::Load { filename, content },
                ClientOp::List => CommandKind::List,
                ClientOp::Append { filename, content } => match self.file_ids.get(&filename) {
                    Some(file_id) => CommandKind::Append {
                        file_id: *file_id,
                        content,
                    },
                    None => {
                        self.skip(&filename);
                        continue;
                    }
                },
                ClientOp::Delete { filename } => match self.file_ids.get(&filename) {
                    Some(file_id) => CommandKind::Delete { file_id: *file_id },
                    None => {
                        self.skip(&filename);
                        continue;
                    }
                },
            };
            let command_id = self.next_command_id;
            self.next_command_id += 1;
            return Some(Command::new(self.id, command_id, kind));
        }
        None
    }

    /// Record a local failure for an operation on a file this client never loaded
    fn skip(&mut self, filename: &str) {
        tracing::warn!(client = %self.id, filename, "no file loaded under this name, skipping");
        let command_id = self.next_command_id;
        self.next_command_id += 1;
        self.results.push((
            command_id,
            ExecutionResult::Failed {
                reason: format!("unknown file: {filename}"),
            },
        ));
    }

    fn request(&self, command: &Command) -> Envelope {
        Envelope::new(
            self.id,
            self.target,
            Message::ClientRequest {
                command: command.clone(),
            },
        )
    }

    fn complete(&mut self, command: Command, result: ExecutionResult) {
        match (&command.kind, &result) {
            (CommandKind::Load { filename, .. }, ExecutionResult::Loaded { file_id, .. }) => {
                self.file_ids.insert(filename.clone(), *file_id);
            }
            (CommandKind::Delete { file_id }, ExecutionResult::Deleted { .. }) => {
                self.file_ids.retain(|_, id| id != file_id);
            }
            _ => {}
        }
        tracing::info!(client = %self.id, command = %command, result = ?result, "command completed");
        self.results.push((command.command_id, result));
        self.deadline = None;
    }

    fn ack(&self, target: ProcessId, control: ControlKind) -> Vec<Envelope> {
        vec![Envelope::new(self.id, target, Message::Ack { control })]
    }
}

impl Process for ClientSession {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn handle(&mut self, envelope: Envelope, _now: Instant) -> Vec<Envelope> {
        let Envelope { sender, message, .. } = envelope;
        match message {
            Message::Crash => {
                tracing::warn!(client = %self.id, "crashing");
                self.crashed = true;
                return self.ack(sender, ControlKind::Crash);
            }
            Message::SetSpeed { speed } => {
                self.speed = speed;
                return self.ack(sender, ControlKind::SetSpeed);
            }
            Message::Start => {
                tracing::info!(client = %self.id, "starting");
                self.started = true;
                return self.ack(sender, ControlKind::Start);
            }
            Message::Recover => {
                tracing::info!(client = %self.id, "recovered");
                self.crashed = false;
                // Resend the command in flight right away
                self.deadline = None;
                return self.ack(sender, ControlKind::Recover);
            }
            _ => {}
        }
        if !self.started || self.crashed {
            return Vec::new();
        }

        match message {
            Message::LeaderRedirect { leader_id } => {
                if self.deadline.is_some() {
                    let target = match leader_id {
                        Some(leader) if leader != self.target => leader,
                        _ => self.random_server(),
                    };
                    tracing::debug!(client = %self.id, from = %sender, to = %target, "redirected");
                    self.target = target;
                    self.deadline = None;
                }
            }
            Message::CommandResult { command_id, result } => {
                let in_flight = self
                    .current
                    .as_ref()
                    .is_some_and(|c| c.command_id == command_id);
                if in_flight {
                    self.target = sender;
                    if let Some(command) = self.current.take() {
                        self.complete(command, result);
                    }
                }
            }
            other => {
                tracing::warn!(client = %self.id, from = %sender, message = other.name(), "unexpected message for a client");
            }
        }
        Vec::new()
    }

    fn tick(&mut self, now: Instant) -> Vec<Envelope> {
        if !self.started || self.crashed {
            return Vec::new();
        }
        if self.current.is_none() {
            self.current = self.next_command();
            self.deadline = None;
        }
        let Some(command) = &self.current else {
            return Vec::new();
        };

        match self.deadline {
            Some(deadline) if now < deadline => Vec::new(),
            Some(_) => {
                tracing::debug!(client = %self.id, server = %self.target, command = %command, "request timed out");
                self.target = self.random_server();
                let Some(command) = &self.current else {
                    return Vec::new();
                };
                let request = self.request(command);
                self.deadline = Some(now + self.request_timeout);
                vec![request]
            }
            None => {
                let request = self.request(command);
                self.deadline = Some(now + self.request_timeout);
                vec![request]
            }
        }
    }

    fn pause(&self) -> Duration {
        self.speed.delay()
    }
}
