//! Raft server state machine
//!
//! `RaftServer` owns all consensus state of one server process and is driven
//! through the [`Process`] interface: every inbound envelope is dispatched with
//! a single `match` on the message variant, and `tick` drives timers and the
//! application of committed entries.
//!
//! Persistent state (`current_term`, `voted_for`, log) is saved at the end of
//! every step that changed it, before that step's outbound messages are
//! released. If saving fails the messages are dropped; Raft's timeouts take
//! care of the retry.

mod election;
mod replication;

use crate::log::ReplicatedLog;
use crate::message::{ControlKind, Envelope, Message};
use crate::process::Process;
use crate::storage::{PersistentState, StateStorage};
use crate::timer::{ElectionTimeout, SoftTimer};
use raftfs_core::{
    CommandId, LogIndex, ProcessId, RaftConfig, RaftFsError, Result, Speed, Term,
};
use raftfs_store::{CommandSink, ExecutionResult};
use replication::LeaderState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Role of a server in its current term
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Follower => f.write_str("follower"),
            Self::Candidate => f.write_str("candidate"),
            Self::Leader => f.write_str("leader"),
        }
    }
}

/// Snapshot of a server's state for operators
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub id: ProcessId,
    pub role: Role,
    pub term: Term,
    pub leader_hint: Option<ProcessId>,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub last_log_index: LogIndex,
    pub crashed: bool,
    /// Whether the operator sent `Start`
    pub started: bool,
    pub speed: Speed,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leader = self
            .leader_hint
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "server {:<3} {:<9} term {:<4} leader {:<3} log {:<4} commit {:<4} applied {:<4} speed {:<6}{}{}",
            self.id,
            self.role,
            self.term,
            leader,
            self.last_log_index,
            self.commit_index,
            self.last_applied,
            self.speed,
            if self.started { "" } else { " not-started" },
            if self.crashed { " CRASHED" } else { "" }
        )
    }
}

/// A Raft server
pub struct RaftServer {
    id: ProcessId,
    nb_servers: u64,
    peers: Vec<ProcessId>,
    config: RaftConfig,

    // Persistent state
    state: PersistentState,
    storage: Box<dyn StateStorage>,
    dirty: bool,

    // Volatile state
    role: Role,
    commit_index: LogIndex,
    last_applied: LogIndex,
    leader_hint: Option<ProcessId>,
    votes: BTreeSet<ProcessId>,
    leader: Option<LeaderState>,

    // Timers
    election_timer: SoftTimer,
    election_timeout: ElectionTimeout,
    heartbeat_timer: SoftTimer,
    last_checked: Option<Instant>,

    // Operator-controlled
    crashed: bool,
    started: bool,
    speed: Speed,

    sink: Box<dyn CommandSink>,
    /// Last applied command and its result, per client
    sessions: HashMap<ProcessId, (CommandId, ExecutionResult)>,
}

impl RaftServer {
    /// Create server `id` of a cluster of `nb_servers`, reloading any saved state
    pub fn new(
        id: ProcessId,
        nb_servers: u64,
        config: &RaftConfig,
        sink: Box<dyn CommandSink>,
        storage: Box<dyn StateStorage>,
    ) -> Result<Self> {
        config.validate()?;
        if !id.is_server(nb_servers) {
            return Err(RaftFsError::Config(format!(
                "{id} is not a server id in a cluster of {nb_servers}"
            )));
        }
        let state = storage.load()?.unwrap_or_default();
        if state.current_term > 0 {
            tracing::info!(
                server = %id,
                term = state.current_term,
                last_index = state.log.last_index(),
                "restored persistent state"
            );
        }

        let mut election_timeout = ElectionTimeout::new(config, id);
        let election_timer = SoftTimer::new(election_timeout.next());

        Ok(Self {
            id,
            nb_servers,
            peers: (1..=nb_servers)
                .map(ProcessId::new)
                .filter(|p| *p != id)
                .collect(),
            config: config.clone(),
            state,
            storage,
            dirty: false,
            role: Role::Follower,
            commit_index: 0,
            last_applied: 0,
            leader_hint: None,
            votes: BTreeSet::new(),
            leader: None,
            election_timer,
            election_timeout,
            heartbeat_timer: SoftTimer::new(config.heartbeat_interval),
            last_checked: None,
            crashed: false,
            started: false,
            speed: Speed::default(),
            sink,
            sessions: HashMap::new(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn current_term(&self) -> Term {
        self.state.current_term
    }

    pub fn voted_for(&self) -> Option<ProcessId> {
        self.state.voted_for
    }

    pub fn log(&self) -> &ReplicatedLog {
        &self.state.log
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn leader_hint(&self) -> Option<ProcessId> {
        self.leader_hint
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            id: self.id,
            role: self.role,
            term: self.state.current_term,
            leader_hint: self.leader_hint,
            commit_index: self.commit_index,
            last_applied: self.last_applied,
            last_log_index: self.state.log.last_index(),
            crashed: self.crashed,
            started: self.started,
            speed: self.speed,
        }
    }

    /// Number of votes (or replicas) forming a strict majority
    fn majority(&self) -> usize {
        (self.nb_servers / 2 + 1) as usize
    }

    fn envelope(&self, target: ProcessId, message: Message) -> Envelope {
        Envelope::new(self.id, target, message)
    }

    /// Elapsed time since the previous tick, minus the pause the speed setting adds
    fn elapsed(&mut self, now: Instant) -> Duration {
        let delta = match self.last_checked {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last_checked = Some(now);
        delta.saturating_sub(self.speed.delay())
    }

    /// Release the outbound messages of a step once its state is durable
    fn finish(&mut self, outbound: Vec<Envelope>) -> Vec<Envelope> {
        if !self.dirty {
            return outbound;
        }
        match self.storage.save(&self.state) {
            Ok(()) => {
                self.dirty = false;
                outbound
            }
            Err(e) => {
                tracing::error!(
                    server = %self.id,
                    error = %e,
                    dropped = outbound.len(),
                    "failed to persist raft state"
                );
                Vec::new()
            }
        }
    }

    fn dispatch(&mut self, sender: ProcessId, message: Message, now: Instant, out: &mut Vec<Envelope>) {
        match message {
            Message::RequestVote(m) => self.handle_request_vote(sender, m, out),
            Message::RequestVoteResponse(m) => self.handle_request_vote_response(sender, m, out),
            Message::AppendEntries(m) => self.handle_append_entries(sender, m, out),
            Message::AppendEntriesResponse(m) => {
                self.handle_append_entries_response(sender, m, out)
            }
            Message::ClientRequest { command } => self.handle_client_request(sender, command, out),
            Message::Crash => {
                tracing::warn!(server = %self.id, "crashing");
                self.crashed = true;
                out.push(self.ack(sender, ControlKind::Crash));
            }
            Message::SetSpeed { speed } => {
                tracing::info!(server = %self.id, from = %self.speed, to = %speed, "changing speed");
                self.speed = speed;
                out.push(self.ack(sender, ControlKind::SetSpeed));
            }
            Message::Start => {
                tracing::info!(server = %self.id, "starting");
                self.started = true;
                out.push(self.ack(sender, ControlKind::Start));
            }
            Message::Recover => {
                self.recover(now);
                out.push(self.ack(sender, ControlKind::Recover));
            }
            Message::LeaderRedirect { .. } | Message::CommandResult { .. } | Message::Ack { .. } => {
                tracing::warn!(
                    server = %self.id,
                    from = %sender,
                    message = message.name(),
                    "unexpected message for a server"
                );
            }
        }
    }

    fn ack(&self, target: ProcessId, control: ControlKind) -> Envelope {
        self.envelope(target, Message::Ack { control })
    }

    /// Come back from a crash: reload persistent state, forget volatile role state.
    /// A running server only restarts its timers.
    fn recover(&mut self, now: Instant) {
        if !self.crashed {
            self.reset_election_timer();
            self.heartbeat_timer.reset(self.config.heartbeat_interval);
            self.last_checked = Some(now);
            tracing::info!(server = %self.id, role = %self.role, "timers reset");
            return;
        }

        match self.storage.load() {
            Ok(Some(state)) => {
                self.state = state;
                self.dirty = false;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(server = %self.id, error = %e, "failed to reload raft state");
            }
        }
        let last_index = self.state.log.last_index();
        self.commit_index = self.commit_index.min(last_index);
        self.last_applied = self.last_applied.min(last_index);

        self.crashed = false;
        self.role = Role::Follower;
        self.leader = None;
        self.leader_hint = None;
        self.votes.clear();
        self.reset_election_timer();
        self.heartbeat_timer.reset(self.config.heartbeat_interval);
        self.last_checked = Some(now);

        tracing::info!(
            server = %self.id,
            term = self.state.current_term,
            last_index,
            "recovered"
        );
    }

    fn reset_election_timer(&mut self) {
        let timeout = self.election_timeout.next();
        self.election_timer.reset(timeout);
    }

    /// Apply every committed entry not yet applied, in log order
    fn apply_committed(&mut self, out: &mut Vec<Envelope>) {
        while self.last_applied < self.commit_index {
            let index = self.last_applied + 1;
            let command = match self.state.log.entry(index) {
                Ok(entry) => entry.command.clone(),
                Err(e) => {
                    tracing::error!(server = %self.id, index, error = %e, "committed entry missing");
                    return;
                }
            };
            let Some(command) = command else {
                self.last_applied = index;
                continue;
            };

            let result = match self.sink.execute(&command) {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        server = %self.id,
                        index,
                        command = %command,
                        error = %e,
                        "failed to apply command, will retry"
                    );
                    return;
                }
            };
            self.last_applied = index;
            tracing::info!(server = %self.id, index, command = %command, "applied");

            let newer = self
                .sessions
                .get(&command.client_id)
                .map_or(true, |(last, _)| *last <= command.command_id);
            if newer {
                self.sessions
                    .insert(command.client_id, (command.command_id, result.clone()));
            }

            if self.role == Role::Leader {
                out.push(self.envelope(
                    command.client_id,
                    Message::CommandResult {
                        command_id: command.command_id,
                        result,
                    },
                ));
            }
        }
    }
}

impl Process for RaftServer {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn handle(&mut self, envelope: Envelope, now: Instant) -> Vec<Envelope> {
        let Envelope { sender, message, .. } = envelope;
        if self.crashed && message.control_kind().is_none() {
            tracing::trace!(server = %self.id, from = %sender, message = message.name(), "crashed, dropping");
            return Vec::new();
        }
        tracing::debug!(
            server = %self.id,
            from = %sender,
            message = message.name(),
            term = ?message.term(),
            "received"
        );

        let mut out = Vec::new();
        self.dispatch(sender, message, now, &mut out);
        self.finish(out)
    }

    fn tick(&mut self, now: Instant) -> Vec<Envelope> {
        let delta = self.elapsed(now);
        if self.crashed {
            return Vec::new();
        }

        let mut out = Vec::new();
        self.apply_committed(&mut out);

        if self.role == Role::Leader {
            self.heartbeat_timer.advance(delta);
            if self.heartbeat_timer.expired() {
                self.broadcast_append_entries(&mut out);
                self.heartbeat_timer.reset(self.config.heartbeat_interval);
            }
        } else {
            self.election_timer.advance(delta);
            if self.election_timer.expired() {
                self.start_election(&mut out);
            }
        }
        self.finish(out)
    }

    fn pause(&self) -> Duration {
        self.speed.delay()
    }
}

impl fmt::Debug for RaftServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaftServer")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("term", &self.state.current_term)
            .field("commit_index", &self.commit_index)
            .field("last_applied", &self.last_applied)
            .field("last_index", &self.state.log.last_index())
            .finish()
    }
}
