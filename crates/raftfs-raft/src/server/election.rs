//! Leader election

use super::replication::LeaderState;
use super::{RaftServer, Role};
use crate::log::LogEntry;
use crate::message::{Envelope, Message, RequestVote, RequestVoteResponse};
use raftfs_core::{ProcessId, Term};

impl RaftServer {
    /// Adopt a higher term seen in any consensus message, stepping down to follower.
    /// Returns `true` if the term changed.
    pub(super) fn observe_term(&mut self, term: Term) -> bool {
        if term <= self.state.current_term {
            return false;
        }
        tracing::info!(
            server = %self.id,
            old_term = self.state.current_term,
            new_term = term,
            role = %self.role,
            "newer term observed"
        );
        self.state.current_term = term;
        self.state.voted_for = None;
        self.leader_hint = None;
        self.dirty = true;
        if self.role != Role::Follower {
            self.become_follower(None);
        }
        true
    }

    pub(super) fn become_follower(&mut self, leader: Option<ProcessId>) {
        if self.role != Role::Follower {
            tracing::info!(server = %self.id, term = self.state.current_term, "stepping down to follower");
        }
        let was_leader = self.role == Role::Leader;
        self.role = Role::Follower;
        self.leader = None;
        self.votes.clear();
        self.leader_hint = leader;
        if was_leader {
            self.reset_election_timer();
        }
    }

    /// Election timeout elapsed: start a new term as candidate
    pub(super) fn start_election(&mut self, out: &mut Vec<Envelope>) {
        self.state.current_term += 1;
        self.state.voted_for = Some(self.id);
        self.dirty = true;
        self.role = Role::Candidate;
        self.leader = None;
        self.leader_hint = None;
        self.votes.clear();
        self.votes.insert(self.id);
        self.reset_election_timer();

        tracing::info!(
            server = %self.id,
            term = self.state.current_term,
            last_index = self.state.log.last_index(),
            "starting election"
        );

        if self.votes.len() >= self.majority() {
            self.become_leader(out);
            return;
        }

        let request = RequestVote {
            term: self.state.current_term,
            candidate_id: self.id,
            last_log_index: self.state.log.last_index(),
            last_log_term: self.state.log.last_term(),
        };
        for peer in &self.peers {
            out.push(Envelope::new(
                self.id,
                *peer,
                Message::RequestVote(request.clone()),
            ));
        }
    }

    fn become_leader(&mut self, out: &mut Vec<Envelope>) {
        let last_index = self.state.log.last_index();
        tracing::info!(
            server = %self.id,
            term = self.state.current_term,
            votes = self.votes.len(),
            last_index,
            "became leader"
        );
        self.role = Role::Leader;
        self.leader_hint = Some(self.id);
        self.leader = Some(LeaderState::new(&self.peers, last_index));

        // Heartbeat first to assert authority
        self.broadcast_append_entries(out);
        self.heartbeat_timer.reset(self.config.heartbeat_interval);

        // Entries left uncommitted by earlier terms can only commit through an
        // entry of the current term
        if self.commit_index < last_index {
            let index = self
                .state
                .log
                .push(LogEntry::barrier(self.state.current_term));
            self.dirty = true;
            tracing::debug!(server = %self.id, index, "appended barrier entry");
            self.broadcast_append_entries(out);
            self.advance_commit_index();
        }
    }

    pub(super) fn handle_request_vote(
        &mut self,
        sender: ProcessId,
        request: RequestVote,
        out: &mut Vec<Envelope>,
    ) {
        self.observe_term(request.term);

        let can_vote = self
            .state
            .voted_for
            .map_or(true, |v| v == request.candidate_id);
        let granted = request.term == self.state.current_term
            && can_vote
            && self
                .state
                .log
                .is_up_to_date(request.last_log_term, request.last_log_index);

        if granted {
            if self.state.voted_for != Some(request.candidate_id) {
                self.state.voted_for = Some(request.candidate_id);
                self.dirty = true;
            }
            self.reset_election_timer();
        }
        tracing::debug!(
            server = %self.id,
            candidate = %request.candidate_id,
            term = self.state.current_term,
            granted,
            "vote requested"
        );

        out.push(self.envelope(
            sender,
            Message::RequestVoteResponse(RequestVoteResponse {
                term: self.state.current_term,
                vote_granted: granted,
            }),
        ));
    }

    pub(super) fn handle_request_vote_response(
        &mut self,
        sender: ProcessId,
        response: RequestVoteResponse,
        out: &mut Vec<Envelope>,
    ) {
        if self.observe_term(response.term) {
            return;
        }
        if self.role != Role::Candidate || response.term != self.state.current_term {
            return;
        }
        if !response.vote_granted {
            return;
        }

        self.votes.insert(sender);
        tracing::debug!(
            server = %self.id,
            from = %sender,
            votes = self.votes.len(),
            term = self.state.current_term,
            "vote received"
        );
        if self.votes.len() >= self.majority() {
            self.become_leader(out);
        }
    }
}
