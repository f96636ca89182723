//! End-to-end runs of an in-process cluster

use anyhow::Result;
use raftfs_cluster::{ClientOp, LocalCluster};
use raftfs_core::{ClusterConfig, FileId, ProcessId, StoreBackend};
use raftfs_raft::{Message, Role};
use raftfs_store::ExecutionResult;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

fn memory_config(nb_servers: u64) -> ClusterConfig {
    let mut config = ClusterConfig::default();
    config.nb_servers = nb_servers;
    config.store.backend = StoreBackend::Memory;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cluster_elects_a_leader() -> Result<()> {
    let mut cluster = LocalCluster::launch(memory_config(3), Vec::new())?;
    cluster.start_all().await?;

    let leader = cluster.wait_for_leader(TIMEOUT).await?;
    assert!(leader.is_server(3));

    let term = cluster.server_status(leader).map_or(0, |s| s.term);
    let leaders = cluster
        .servers_status()
        .into_iter()
        .filter(|s| s.role == Role::Leader && s.term == term)
        .count();
    assert_eq!(leaders, 1);

    cluster.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_script_runs_to_completion() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = ClusterConfig::default();
    config.data_dir = temp_dir.path().join("servers");
    config.store.backend = StoreBackend::Disk;
    config.raft.rng_seed = Some(7);

    let script = vec![
        ClientOp::Load {
            filename: "a.txt".to_string(),
            content: "hello\n".to_string(),
        },
        ClientOp::Append {
            filename: "a.txt".to_string(),
            content: "more".to_string(),
        },
        ClientOp::List,
        ClientOp::Delete {
            filename: "a.txt".to_string(),
        },
        ClientOp::List,
    ];

    let mut cluster = LocalCluster::launch(config, vec![script])?;
    cluster.start_all().await?;
    cluster.wait_for_clients(TIMEOUT).await?;

    let client = cluster
        .client_status(ProcessId::new(4))
        .expect("client 4 is registered");
    let results: Vec<_> = client.results.into_iter().map(|(_, r)| r).collect();
    assert_eq!(
        results,
        vec![
            ExecutionResult::Loaded {
                file_id: FileId::new(0),
                filename: "a.txt".to_string()
            },
            ExecutionResult::Appended {
                file_id: FileId::new(0)
            },
            ExecutionResult::Listed {
                file_ids: vec![FileId::new(0)]
            },
            ExecutionResult::Deleted {
                file_id: FileId::new(0)
            },
            ExecutionResult::Listed { file_ids: vec![] },
        ]
    );

    // Every server ends up applying the same log
    cluster
        .wait_for(TIMEOUT, |c| {
            let statuses = c.servers_status();
            statuses
                .iter()
                .all(|s| s.last_applied == statuses[0].last_applied && s.last_applied >= 5)
        })
        .await?;

    for id in cluster.server_ids() {
        assert!(cluster.config().server_dir(id).join("raft-state.json").exists());
    }

    cluster.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crashed_leader_is_replaced() -> Result<()> {
    let mut cluster = LocalCluster::launch(memory_config(3), Vec::new())?;
    cluster.start_all().await?;
    let old_leader = cluster.wait_for_leader(TIMEOUT).await?;

    cluster.control(old_leader, Message::Crash).await?;
    cluster
        .wait_for(TIMEOUT, |c| c.leader().is_some_and(|l| l != old_leader))
        .await?;
    let new_leader = cluster.leader().expect("a new leader was elected");
    let new_term = cluster
        .server_status(new_leader)
        .map(|s| s.term)
        .unwrap_or_default();

    cluster.control(old_leader, Message::Recover).await?;
    cluster
        .wait_for(TIMEOUT, |c| {
            c.server_status(old_leader)
                .is_some_and(|s| !s.crashed && s.role == Role::Follower && s.term >= new_term)
        })
        .await?;

    cluster.shutdown().await
}

#[tokio::test(flavor = "multi_thread")]
async fn test_control_rejects_unknown_process() -> Result<()> {
    let mut cluster = LocalCluster::launch(memory_config(3), Vec::new())?;

    assert!(cluster.control(ProcessId::new(42), Message::Start).await.is_err());
    assert!(cluster.control(ProcessId::OPERATOR, Message::Start).await.is_err());
    assert!(cluster
        .control(ProcessId::new(1), Message::LeaderRedirect { leader_id: None })
        .await
        .is_err());

    cluster.shutdown().await
}
