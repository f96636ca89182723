//! Replicated log
//!
//! The log always holds a sentinel entry at index 0 (term 0, no command) so
//! that "previous entry" lookups for index 1 never need a special case.
//! Real entries are created in term 1 or later.

use raftfs_core::{CommandId, LogIndex, ProcessId, RaftFsError, Result, Term};
use raftfs_store::Command;
use serde::{Deserialize, Serialize};

/// A single log entry
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Term when the entry was received by the leader
    pub term: Term,
    /// Client command, `None` for the sentinel and for leader barriers
    pub command: Option<Command>,
}

impl LogEntry {
    pub fn new(term: Term, command: Command) -> Self {
        Self {
            term,
            command: Some(command),
        }
    }

    /// Entry without a command, appended by a new leader so that entries of
    /// earlier terms can be committed through it
    pub fn barrier(term: Term) -> Self {
        Self {
            term,
            command: None,
        }
    }

    fn sentinel() -> Self {
        Self {
            term: 0,
            command: None,
        }
    }
}

/// Ordered, append-only (modulo conflict truncation) sequence of entries
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedLog {
    entries: Vec<LogEntry>,
}

impl Default for ReplicatedLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicatedLog {
    pub fn new() -> Self {
        Self {
            entries: vec![LogEntry::sentinel()],
        }
    }

    /// Index of the last entry (0 when only the sentinel is present)
    pub fn last_index(&self) -> LogIndex {
        (self.entries.len() - 1) as LogIndex
    }

    /// Term of the last entry
    pub fn last_term(&self) -> Term {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    pub fn entry(&self, index: LogIndex) -> Result<&LogEntry> {
        self.entries.get(index as usize).ok_or(RaftFsError::OutOfRange {
            index,
            last_index: self.last_index(),
        })
    }

    pub fn term_at(&self, index: LogIndex) -> Result<Term> {
        self.entry(index).map(|e| e.term)
    }

    /// Check whether the log has an entry at `index` with term `term`
    pub fn matches(&self, index: LogIndex, term: Term) -> bool {
        self.term_at(index).map(|t| t == term).unwrap_or(false)
    }

    /// Copy of every entry from `index` to the end (empty past the end)
    pub fn entries_from(&self, index: LogIndex) -> Vec<LogEntry> {
        let start = (index as usize).clamp(1, self.entries.len());
        self.entries[start..].to_vec()
    }

    /// Append one entry and return its index
    pub fn push(&mut self, entry: LogEntry) -> LogIndex {
        self.entries.push(entry);
        self.last_index()
    }

    pub fn append(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        self.entries.extend(entries);
    }

    /// Remove the entries at and after `index`. The sentinel cannot be removed.
    pub fn truncate_from(&mut self, index: LogIndex) -> Result<()> {
        if index == 0 || index > self.last_index() + 1 {
            return Err(RaftFsError::OutOfRange {
                index,
                last_index: self.last_index(),
            });
        }
        self.entries.truncate(index as usize);
        Ok(())
    }

    /// Index of the entry carrying the request `(client_id, command_id)`, if any
    pub fn find_request(&self, client_id: ProcessId, command_id: CommandId) -> Option<LogIndex> {
        self.entries
            .iter()
            .position(|e| {
                e.command
                    .as_ref()
                    .is_some_and(|c| c.is_request(client_id, command_id))
            })
            .map(|i| i as LogIndex)
    }

    /// Raft's up-to-date rule: a later last term wins, on a tie the longer log wins
    pub fn is_up_to_date(&self, last_log_term: Term, last_log_index: LogIndex) -> bool {
        last_log_term > self.last_term()
            || (last_log_term == self.last_term() && last_log_index >= self.last_index())
    }

    /// Number of real entries (the sentinel excluded)
    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raftfs_store::CommandKind;

    fn entry(term: Term, command_id: CommandId) -> LogEntry {
        LogEntry::new(term, Command::new(ProcessId::new(7), command_id, CommandKind::List))
    }

    #[test]
    fn test_sentinel() {
        let log = ReplicatedLog::new();
        assert_eq!(log.last_index(), 0);
        assert_eq!(log.last_term(), 0);
        assert_eq!(log.term_at(0).unwrap(), 0);
        assert!(log.entry(0).unwrap().command.is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_term_at_out_of_range() {
        let mut log = ReplicatedLog::new();
        log.push(entry(1, 1));
        assert!(matches!(
            log.term_at(2),
            Err(RaftFsError::OutOfRange { index: 2, last_index: 1 })
        ));
        assert!(!log.matches(5, 1));
        assert!(log.matches(1, 1));
    }

    #[test]
    fn test_truncate_and_entries_from() {
        let mut log = ReplicatedLog::new();
        log.append(vec![entry(1, 1), entry(1, 2), entry(2, 3)]);
        assert_eq!(log.last_index(), 3);
        assert_eq!(log.entries_from(2).len(), 2);
        assert_eq!(log.entries_from(4).len(), 0);
        assert_eq!(log.entries_from(0).len(), 3);

        log.truncate_from(2).unwrap();
        assert_eq!(log.last_index(), 1);
        assert_eq!(log.last_term(), 1);

        assert!(log.truncate_from(0).is_err());
        assert!(log.truncate_from(5).is_err());
    }

    #[test]
    fn test_up_to_date_rule() {
        let mut log = ReplicatedLog::new();
        log.append(vec![entry(1, 1), entry(2, 2)]);

        assert!(log.is_up_to_date(3, 1));
        assert!(log.is_up_to_date(2, 2));
        assert!(log.is_up_to_date(2, 5));
        assert!(!log.is_up_to_date(2, 1));
        assert!(!log.is_up_to_date(1, 9));
    }

    #[test]
    fn test_find_request() {
        let mut log = ReplicatedLog::new();
        log.append(vec![entry(1, 1), entry(1, 2)]);
        assert_eq!(log.find_request(ProcessId::new(7), 2), Some(2));
        assert_eq!(log.find_request(ProcessId::new(8), 2), None);
        assert_eq!(log.find_request(ProcessId::new(7), 3), None);
    }
}
