//! Cooperative process runtime
//!
//! Each process runs in its own task and owns its state outright. One loop
//! iteration drains every queued inbound message, dispatching each to
//! completion, then ticks the process, publishes its status, and sleeps for
//! the loop interval plus the pause of the process's speed setting.

use raftfs_raft::{Envelope, Process, Transport};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Drive `process` until `shutdown` flips to `true`, then hand it back.
///
/// `report` is called after every iteration, typically to publish a status.
pub async fn run_process<P, T, F>(
    mut process: P,
    mut transport: T,
    loop_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut report: F,
) -> P
where
    P: Process,
    T: Transport,
    F: FnMut(&P),
{
    let id = process.id();
    tracing::debug!(process = %id, "process loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        while let Some(received) = transport.try_receive() {
            match received {
                Ok(envelope) => {
                    let outbound = process.handle(envelope, Instant::now());
                    send_all(&transport, outbound);
                }
                Err(e) => {
                    tracing::warn!(process = %id, error = %e, "dropping malformed message");
                }
            }
        }

        let outbound = process.tick(Instant::now());
        send_all(&transport, outbound);
        report(&process);

        let pause = loop_interval + process.pause();
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!(process = %id, "process loop stopped");
    process
}

/// Send failures are not fatal: Raft's timers retry on their own
fn send_all<T: Transport>(transport: &T, outbound: Vec<Envelope>) {
    for envelope in outbound {
        let Err(e) = transport.send(&envelope) else {
            continue;
        };
        if e.is_retriable() {
            tracing::debug!(
                from = %envelope.sender,
                to = %envelope.target,
                message = envelope.message.name(),
                error = %e,
                "send failed"
            );
        } else {
            tracing::warn!(
                from = %envelope.sender,
                to = %envelope.target,
                message = envelope.message.name(),
                error = %e,
                "message dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raftfs_core::ProcessId;
    use raftfs_raft::{MemoryNetwork, Message};

    /// Answers every `Start` with an ack and counts ticks
    struct Echo {
        id: ProcessId,
        ticks: usize,
    }

    impl Process for Echo {
        fn id(&self) -> ProcessId {
            self.id
        }

        fn handle(&mut self, envelope: Envelope, _now: Instant) -> Vec<Envelope> {
            vec![Envelope::new(
                self.id,
                envelope.sender,
                Message::Ack {
                    control: raftfs_raft::ControlKind::Start,
                },
            )]
        }

        fn tick(&mut self, _now: Instant) -> Vec<Envelope> {
            self.ticks += 1;
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_loop_answers_and_stops() {
        let network = MemoryNetwork::new();
        let mut operator = network.register(ProcessId::OPERATOR);
        let transport = network.register(ProcessId::new(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_process(
            Echo {
                id: ProcessId::new(1),
                ticks: 0,
            },
            transport,
            Duration::from_millis(1),
            shutdown_rx,
            |_| {},
        ));

        // Garbage is dropped without stopping the loop
        network.send_raw(ProcessId::new(1), b"???".to_vec()).unwrap();
        operator
            .send(&Envelope::new(ProcessId::OPERATOR, ProcessId::new(1), Message::Start))
            .unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(1), operator.receive())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reply.sender, ProcessId::new(1));

        shutdown_tx.send(true).unwrap();
        let echo = task.await.unwrap();
        assert!(echo.ticks > 0);
    }
}
