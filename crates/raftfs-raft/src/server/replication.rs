//! Log replication, commit advancement and client requests

use super::{RaftServer, Role};
use crate::log::LogEntry;
use crate::message::{AppendEntries, AppendEntriesResponse, Envelope, Message};
use raftfs_core::{LogIndex, ProcessId, Result};
use raftfs_store::Command;
use std::collections::BTreeMap;

/// Per-follower replication progress, only present while leader
#[derive(Clone, Debug)]
pub(crate) struct LeaderState {
    /// Next log index to send to each follower
    pub(crate) next_index: BTreeMap<ProcessId, LogIndex>,
    /// Highest log index known to be replicated on each follower
    pub(crate) match_index: BTreeMap<ProcessId, LogIndex>,
}

impl LeaderState {
    pub(crate) fn new(peers: &[ProcessId], last_index: LogIndex) -> Self {
        Self {
            next_index: peers.iter().map(|p| (*p, last_index + 1)).collect(),
            match_index: peers.iter().map(|p| (*p, 0)).collect(),
        }
    }

    fn next_for(&self, peer: ProcessId) -> LogIndex {
        self.next_index.get(&peer).copied().unwrap_or(1)
    }

    fn match_for(&self, peer: ProcessId) -> LogIndex {
        self.match_index.get(&peer).copied().unwrap_or(0)
    }

    /// Number of followers whose log is known to contain `index`
    fn replicated_on(&self, index: LogIndex) -> usize {
        self.match_index.values().filter(|m| **m >= index).count()
    }
}

impl RaftServer {
    /// Build the AppendEntries a follower needs, starting at its `next_index`
    fn append_entries_for(&self, peer: ProcessId) -> Option<Result<AppendEntries>> {
        let leader = self.leader.as_ref()?;
        let next = leader.next_for(peer).clamp(1, self.state.log.last_index() + 1);
        let prev_log_index = next - 1;
        Some(
            self.state
                .log
                .term_at(prev_log_index)
                .map(|prev_log_term| AppendEntries {
                    term: self.state.current_term,
                    leader_id: self.id,
                    prev_log_index,
                    prev_log_term,
                    entries: self.state.log.entries_from(next),
                    leader_commit: self.commit_index,
                }),
        )
    }

    pub(super) fn send_append_entries(&self, peer: ProcessId, out: &mut Vec<Envelope>) {
        match self.append_entries_for(peer) {
            Some(Ok(request)) => {
                out.push(self.envelope(peer, Message::AppendEntries(request)));
            }
            Some(Err(e)) => {
                tracing::error!(server = %self.id, peer = %peer, error = %e, "cannot build AppendEntries");
            }
            None => {}
        }
    }

    /// Heartbeat, or catch-up for lagging followers
    pub(super) fn broadcast_append_entries(&self, out: &mut Vec<Envelope>) {
        for peer in &self.peers {
            self.send_append_entries(*peer, out);
        }
    }

    pub(super) fn handle_append_entries(
        &mut self,
        sender: ProcessId,
        request: AppendEntries,
        out: &mut Vec<Envelope>,
    ) {
        self.observe_term(request.term);

        let success = self.accept_append_entries(&request);
        let match_index = if success {
            request.prev_log_index + request.entries.len() as LogIndex
        } else {
            0
        };
        out.push(self.envelope(
            sender,
            Message::AppendEntriesResponse(AppendEntriesResponse {
                term: self.state.current_term,
                success,
                match_index,
            }),
        ));
    }

    /// Follower side of AppendEntries. Returns whether the request was accepted.
    fn accept_append_entries(&mut self, request: &AppendEntries) -> bool {
        if request.term < self.state.current_term {
            tracing::debug!(
                server = %self.id,
                from = %request.leader_id,
                stale_term = request.term,
                term = self.state.current_term,
                "rejecting AppendEntries from stale leader"
            );
            return false;
        }
        if self.role == Role::Leader {
            tracing::warn!(
                server = %self.id,
                other = %request.leader_id,
                term = request.term,
                "second leader in the same term"
            );
            return false;
        }

        self.become_follower(Some(request.leader_id));
        self.reset_election_timer();

        if !self
            .state
            .log
            .matches(request.prev_log_index, request.prev_log_term)
        {
            tracing::debug!(
                server = %self.id,
                prev_log_index = request.prev_log_index,
                prev_log_term = request.prev_log_term,
                last_index = self.state.log.last_index(),
                "log inconsistency"
            );
            return false;
        }

        for (offset, entry) in request.entries.iter().enumerate() {
            let index = request.prev_log_index + 1 + offset as LogIndex;
            if index <= self.state.log.last_index() {
                if self.state.log.matches(index, entry.term) {
                    continue;
                }
                if index <= self.commit_index {
                    tracing::error!(
                        server = %self.id,
                        index,
                        commit_index = self.commit_index,
                        "leader conflicts with a committed entry"
                    );
                    return false;
                }
                if let Err(e) = self.state.log.truncate_from(index) {
                    tracing::error!(server = %self.id, index, error = %e, "truncation failed");
                    return false;
                }
                tracing::debug!(server = %self.id, index, "truncated conflicting entries");
            }
            self.state
                .log
                .append(request.entries[offset..].iter().cloned());
            self.dirty = true;
            break;
        }

        let verified = request.prev_log_index + request.entries.len() as LogIndex;
        let commit = request.leader_commit.min(verified);
        if commit > self.commit_index {
            self.commit_index = commit;
            tracing::debug!(server = %self.id, commit_index = commit, "commit index advanced");
        }
        true
    }

    pub(super) fn handle_append_entries_response(
        &mut self,
        sender: ProcessId,
        response: AppendEntriesResponse,
        out: &mut Vec<Envelope>,
    ) {
        if self.observe_term(response.term) {
            return;
        }
        if self.role != Role::Leader || response.term != self.state.current_term {
            return;
        }
        let last_index = self.state.log.last_index();
        let Some(leader) = self.leader.as_mut() else {
            return;
        };

        if response.success {
            let matched = leader.match_for(sender).max(response.match_index.min(last_index));
            leader.match_index.insert(sender, matched);
            leader.next_index.insert(sender, matched + 1);
            self.advance_commit_index();
        } else {
            let next = leader
                .next_for(sender)
                .saturating_sub(1)
                .max(leader.match_for(sender) + 1)
                .max(1);
            leader.next_index.insert(sender, next);
            tracing::debug!(server = %self.id, peer = %sender, next_index = next, "backing off");
            self.send_append_entries(sender, out);
        }
    }

    /// Commit the highest index of the current term stored on a majority
    pub(super) fn advance_commit_index(&mut self) {
        let Some(leader) = self.leader.as_ref() else {
            return;
        };
        let majority = self.majority();
        let mut index = self.state.log.last_index();
        while index > self.commit_index {
            match self.state.log.term_at(index) {
                Ok(term) if term == self.state.current_term => {}
                // Terms only decrease going backwards
                _ => return,
            }
            // The leader itself holds every entry
            if leader.replicated_on(index) + 1 >= majority {
                tracing::debug!(server = %self.id, commit_index = index, "commit index advanced");
                self.commit_index = index;
                return;
            }
            index -= 1;
        }
    }

    pub(super) fn handle_client_request(
        &mut self,
        sender: ProcessId,
        command: Command,
        out: &mut Vec<Envelope>,
    ) {
        if self.role != Role::Leader {
            tracing::debug!(
                server = %self.id,
                client = %sender,
                leader = ?self.leader_hint,
                "redirecting client"
            );
            out.push(self.envelope(
                sender,
                Message::LeaderRedirect {
                    leader_id: self.leader_hint,
                },
            ));
            return;
        }

        if let Some((last, result)) = self.sessions.get(&command.client_id) {
            if *last == command.command_id {
                tracing::debug!(server = %self.id, command = %command, "already applied, resending result");
                out.push(self.envelope(
                    command.client_id,
                    Message::CommandResult {
                        command_id: command.command_id,
                        result: result.clone(),
                    },
                ));
                return;
            }
            if *last > command.command_id {
                tracing::debug!(server = %self.id, command = %command, "ignoring outdated request");
                return;
            }
        }

        if let Some(index) = self
            .state
            .log
            .find_request(command.client_id, command.command_id)
        {
            tracing::debug!(server = %self.id, index, command = %command, "already in log");
            return;
        }

        let index = self
            .state
            .log
            .push(LogEntry::new(self.state.current_term, command));
        self.dirty = true;
        tracing::info!(server = %self.id, index, term = self.state.current_term, "appended client command");

        self.broadcast_append_entries(out);
        self.advance_commit_index();
    }
}
