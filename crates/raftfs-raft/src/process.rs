//! Cooperative process interface
//!
//! A process is a synchronous state machine. The runtime feeds it inbound
//! envelopes and periodic ticks and sends whatever it returns; the process
//! itself never blocks or touches the transport.

use crate::message::Envelope;
use raftfs_core::ProcessId;
use std::time::{Duration, Instant};

pub trait Process: Send {
    fn id(&self) -> ProcessId;

    /// Handle one inbound envelope
    fn handle(&mut self, envelope: Envelope, now: Instant) -> Vec<Envelope>;

    /// Re-evaluate timers and background work
    fn tick(&mut self, now: Instant) -> Vec<Envelope>;

    /// Extra pause the runtime inserts after each iteration
    fn pause(&self) -> Duration {
        Duration::ZERO
    }
}
