//! RaftFS Raft - Raft consensus engine for the replicated file service
//!
//! This crate provides the consensus layer of RaftFS:
//!
//! - `message`: wire messages exchanged between processes
//! - `log`: the replicated log with its sentinel entry
//! - `storage`: persistence of term, vote and log
//! - `timer`: soft election and heartbeat timers
//! - `network`: transport abstraction and the in-memory message bus
//! - `process`: the cooperative process interface driven by the runtime
//! - `server`: the Raft server state machine

pub mod log;
pub mod message;
pub mod network;
pub mod process;
pub mod server;
pub mod storage;
pub mod timer;

pub use log::{LogEntry, ReplicatedLog};
pub use message::*;
pub use network::{MemoryNetwork, MemoryTransport, Transport};
pub use process::Process;
pub use server::{RaftServer, Role, ServerStatus};
pub use storage::{FileStateStorage, MemoryStateStorage, PersistentState, StateStorage};
pub use timer::{ElectionTimeout, SoftTimer};
