//! In-process cluster
//!
//! Every server and client runs as a tokio task over the in-memory message
//! bus; the cluster handle plays the operator console (process 0).

use crate::client::{ClientSession, ClientStatus};
use crate::runtime::run_process;
use crate::script::ClientOp;
use anyhow::{anyhow, bail, Context, Result};
use dashmap::DashMap;
use raftfs_core::{ClusterConfig, ProcessId, StoreBackend};
use raftfs_raft::{
    Envelope, FileStateStorage, MemoryNetwork, MemoryStateStorage, MemoryTransport, Message,
    RaftServer, Role, ServerStatus, StateStorage, Transport,
};
use raftfs_store::{CommandSink, FileStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long the operator waits for an acknowledgement
const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between two status polls
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct LocalCluster {
    config: ClusterConfig,
    network: MemoryNetwork,
    operator: MemoryTransport,
    servers: Arc<DashMap<ProcessId, ServerStatus>>,
    clients: Arc<DashMap<ProcessId, ClientStatus>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    /// Spawn every server and one client per script. Must be called within a
    /// tokio runtime. Clients stay idle until they receive `Start`.
    pub fn launch(config: ClusterConfig, scripts: Vec<Vec<ClientOp>>) -> Result<Self> {
        config.validate()?;
        let network = MemoryNetwork::new();
        let operator = network.register(ProcessId::OPERATOR);
        let servers = Arc::new(DashMap::new());
        let clients = Arc::new(DashMap::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let loop_interval = config.raft.loop_interval;
        let mut tasks = Vec::new();

        for id in config.server_ids() {
            let (sink, storage) = open_server_store(&config, id)?;
            let server = RaftServer::new(id, config.nb_servers, &config.raft, sink, storage)
                .with_context(|| format!("cannot create server {id}"))?;
            servers.insert(id, server.status());

            let transport = network.register(id);
            let board = Arc::clone(&servers);
            let shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                run_process(server, transport, loop_interval, shutdown_rx, move |s: &RaftServer| {
                    let status = s.status();
                    board.insert(status.id, status);
                })
                .await;
            }));
        }

        for (index, ops) in scripts.into_iter().enumerate() {
            let id = config.client_id(index);
            let client = ClientSession::new(
                id,
                config.nb_servers,
                ops,
                &config.client,
                config.raft.rng_seed,
            );
            clients.insert(id, client.status());

            let transport = network.register(id);
            let board = Arc::clone(&clients);
            let shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                run_process(client, transport, loop_interval, shutdown_rx, move |c: &ClientSession| {
                    let status = c.status();
                    board.insert(status.id, status);
                })
                .await;
            }));
        }

        tracing::info!(
            servers = config.nb_servers,
            clients = clients.len(),
            backend = ?config.store.backend,
            "cluster launched"
        );

        Ok(Self {
            config,
            network,
            operator,
            servers,
            clients,
            shutdown,
            tasks,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn server_ids(&self) -> Vec<ProcessId> {
        self.config.server_ids()
    }

    pub fn client_ids(&self) -> Vec<ProcessId> {
        let mut ids: Vec<_> = self.clients.iter().map(|c| *c.key()).collect();
        ids.sort();
        ids
    }

    /// Send a control message to `target` and wait for its acknowledgement
    pub async fn control(&mut self, target: ProcessId, message: Message) -> Result<()> {
        let kind = message
            .control_kind()
            .ok_or_else(|| anyhow!("{} is not a control message", message.name()))?;
        if target == ProcessId::OPERATOR || !self.network.is_registered(target) {
            bail!("unknown process {target}");
        }

        self.operator
            .send(&Envelope::new(ProcessId::OPERATOR, target, message))?;

        let deadline = Instant::now() + ACK_TIMEOUT;
        loop {
            let received = tokio::time::timeout_at(deadline, self.operator.receive())
                .await
                .map_err(|_| anyhow!("no acknowledgement from process {target}"))?;
            match received {
                Some(Ok(Envelope {
                    sender,
                    message: Message::Ack { control },
                    ..
                })) if sender == target && control == kind => {
                    tracing::debug!(process = %target, control = ?kind, "acknowledged");
                    return Ok(());
                }
                Some(Ok(other)) => {
                    tracing::debug!(from = %other.sender, message = other.message.name(), "operator ignoring message");
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "operator dropping malformed message");
                }
                None => bail!("operator mailbox closed"),
            }
        }
    }

    /// Start every server and client
    pub async fn start_all(&mut self) -> Result<()> {
        let ids: Vec<_> = self.server_ids().into_iter().chain(self.client_ids()).collect();
        for id in ids {
            self.control(id, Message::Start).await?;
        }
        Ok(())
    }

    pub fn server_status(&self, id: ProcessId) -> Option<ServerStatus> {
        self.servers.get(&id).map(|s| s.clone())
    }

    /// Status of every server, ordered by id
    pub fn servers_status(&self) -> Vec<ServerStatus> {
        let mut statuses: Vec<_> = self.servers.iter().map(|s| s.clone()).collect();
        statuses.sort_by_key(|s| s.id);
        statuses
    }

    pub fn client_status(&self, id: ProcessId) -> Option<ClientStatus> {
        self.clients.get(&id).map(|c| c.clone())
    }

    /// Status of every client, ordered by id
    pub fn clients_status(&self) -> Vec<ClientStatus> {
        let mut statuses: Vec<_> = self.clients.iter().map(|c| c.clone()).collect();
        statuses.sort_by_key(|c| c.id);
        statuses
    }

    /// Running leader with the highest term, if no running server is ahead of it
    pub fn leader(&self) -> Option<ProcessId> {
        let running: Vec<_> = self
            .servers_status()
            .into_iter()
            .filter(|s| !s.crashed)
            .collect();
        let max_term = running.iter().map(|s| s.term).max()?;
        running
            .iter()
            .find(|s| s.role == Role::Leader && s.term == max_term)
            .map(|s| s.id)
    }

    /// Poll the status boards until `condition` holds
    pub async fn wait_for(&self, timeout: Duration, condition: impl Fn(&Self) -> bool) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(self) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("condition not reached within {timeout:?}");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn wait_for_leader(&self, timeout: Duration) -> Result<ProcessId> {
        self.wait_for(timeout, |c| c.leader().is_some())
            .await
            .context("no leader elected")?;
        self.leader().ok_or_else(|| anyhow!("leader lost"))
    }

    /// Wait until every client ran its whole script
    pub async fn wait_for_clients(&self, timeout: Duration) -> Result<()> {
        self.wait_for(timeout, |c| {
            c.clients.iter().all(|status| status.is_finished())
        })
        .await
        .context("clients did not finish")
    }

    /// One line per process
    pub fn report(&self) -> String {
        let servers = self.servers_status().into_iter().map(|s| s.to_string());
        let clients = self.clients_status().into_iter().map(|c| c.to_string());
        servers.chain(clients).collect::<Vec<_>>().join("\n")
    }

    /// Stop every process and wait for the tasks to end
    pub async fn shutdown(self) -> Result<()> {
        // Fails only if every task already stopped
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            task.await.context("process task panicked")?;
        }
        tracing::info!("cluster stopped");
        Ok(())
    }
}

fn open_server_store(
    config: &ClusterConfig,
    id: ProcessId,
) -> Result<(Box<dyn CommandSink>, Box<dyn StateStorage>)> {
    match config.store.backend {
        StoreBackend::Memory => Ok((
            Box::new(MemoryStore::new()),
            Box::new(MemoryStateStorage::new()),
        )),
        StoreBackend::Disk => {
            let dir = config.server_dir(id);
            let store = FileStore::open(dir.join("files"))
                .with_context(|| format!("cannot open file store in {}", dir.display()))?;
            let storage = FileStateStorage::open(&dir)
                .with_context(|| format!("cannot open raft state in {}", dir.display()))?;
            Ok((Box::new(store), Box::new(storage)))
        }
    }
}
