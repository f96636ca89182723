//! Transport abstraction and the in-memory message bus
//!
//! Messages cross the bus as encoded bytes, so every hop exercises the wire
//! format exactly like a socket transport would.

use crate::message::Envelope;
use dashmap::DashMap;
use raftfs_core::{ProcessId, RaftFsError, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

/// Point-to-point reliable transport
pub trait Transport: Send {
    /// Process owning this endpoint
    fn local_id(&self) -> ProcessId;

    /// Send an envelope to `envelope.target`
    fn send(&self, envelope: &Envelope) -> Result<()>;

    /// Non-blocking poll. `Some(Err(_))` is a message that failed to decode.
    fn try_receive(&mut self) -> Option<Result<Envelope>>;
}

/// Shared registry of mailboxes
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    mailboxes: Arc<DashMap<ProcessId, UnboundedSender<Vec<u8>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the mailbox of `id`, replacing any previous one
    pub fn register(&self, id: ProcessId) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(id, tx);
        MemoryTransport {
            id,
            network: self.clone(),
            inbox: rx,
        }
    }

    /// Deliver raw bytes, bypassing encoding
    pub fn send_raw(&self, target: ProcessId, bytes: Vec<u8>) -> Result<()> {
        let mailbox = self
            .mailboxes
            .get(&target)
            .ok_or(RaftFsError::UnknownProcess(target))?;
        mailbox.send(bytes).map_err(|_| RaftFsError::Transport {
            target,
            reason: "mailbox closed".to_string(),
        })
    }

    pub fn is_registered(&self, id: ProcessId) -> bool {
        self.mailboxes.contains_key(&id)
    }
}

/// Endpoint of one process on the in-memory bus
#[derive(Debug)]
pub struct MemoryTransport {
    id: ProcessId,
    network: MemoryNetwork,
    inbox: UnboundedReceiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Wait for the next inbound message
    pub async fn receive(&mut self) -> Option<Result<Envelope>> {
        let bytes = self.inbox.recv().await?;
        Some(Envelope::decode(&bytes))
    }
}

impl Transport for MemoryTransport {
    fn local_id(&self) -> ProcessId {
        self.id
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        let bytes = envelope.encode()?;
        self.network.send_raw(envelope.target, bytes)
    }

    fn try_receive(&mut self) -> Option<Result<Envelope>> {
        match self.inbox.try_recv() {
            Ok(bytes) => Some(Envelope::decode(&bytes)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_send_and_poll() {
        let network = MemoryNetwork::new();
        let a = network.register(ProcessId::new(1));
        let mut b = network.register(ProcessId::new(2));

        assert!(b.try_receive().is_none());
        let envelope = Envelope::new(ProcessId::new(1), ProcessId::new(2), Message::Start);
        a.send(&envelope).unwrap();

        assert_eq!(b.try_receive().unwrap().unwrap(), envelope);
        assert!(b.try_receive().is_none());
    }

    #[test]
    fn test_unknown_target() {
        let network = MemoryNetwork::new();
        let a = network.register(ProcessId::new(1));
        let envelope = Envelope::new(ProcessId::new(1), ProcessId::new(9), Message::Crash);
        assert!(matches!(
            a.send(&envelope),
            Err(RaftFsError::UnknownProcess(id)) if id == ProcessId::new(9)
        ));
    }

    #[test]
    fn test_garbage_surfaces_as_protocol_error() {
        let network = MemoryNetwork::new();
        let mut b = network.register(ProcessId::new(2));
        network.send_raw(ProcessId::new(2), b"garbage".to_vec()).unwrap();
        assert!(matches!(b.try_receive(), Some(Err(RaftFsError::Protocol(_)))));
    }

    #[tokio::test]
    async fn test_async_receive() {
        let network = MemoryNetwork::new();
        let a = network.register(ProcessId::new(1));
        let mut b = network.register(ProcessId::new(2));
        let envelope = Envelope::new(ProcessId::new(1), ProcessId::new(2), Message::Recover);
        a.send(&envelope).unwrap();
        assert_eq!(b.receive().await.unwrap().unwrap(), envelope);
    }
}
