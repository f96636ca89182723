//! RaftFS Node - Runs a local cluster and its operator console

use anyhow::{Context, Result};
use clap::Parser;
use raftfs_cluster::console::HELP;
use raftfs_cluster::{load_script, LocalCluster, OperatorCommand};
use raftfs_core::{ClusterConfig, StoreBackend};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "raftfs-node")]
#[command(about = "Raft-replicated file command service")]
struct Args {
    /// JSON configuration file; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of Raft servers
    #[arg(long)]
    servers: Option<u64>,

    /// Command script for one client; repeat for more clients
    #[arg(long = "client", value_name = "SCRIPT")]
    clients: Vec<PathBuf>,

    /// Root folder for the servers' working folders
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep files and Raft state in memory only
    #[arg(long)]
    in_memory: bool,

    /// Seed for election timeouts and client server picks
    #[arg(long)]
    seed: Option<u64>,

    /// Send START to every process right away
    #[arg(long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let scripts = args
        .clients
        .iter()
        .map(load_script)
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        servers = config.nb_servers,
        clients = scripts.len(),
        data_dir = %config.data_dir.display(),
        "Starting RaftFS cluster"
    );

    let mut cluster = LocalCluster::launch(config, scripts)?;
    if args.autostart {
        cluster.start_all().await?;
    }

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("cannot read console input")? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match OperatorCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        match command {
            OperatorCommand::Status => println!("{}", cluster.report()),
            OperatorCommand::Help => println!("{HELP}"),
            OperatorCommand::Exit => break,
            other => {
                if let Some((target, message)) = other.control() {
                    match cluster.control(target, message).await {
                        Ok(()) => println!("ok"),
                        Err(e) => println!("{e:#}"),
                    }
                }
            }
        }
    }

    cluster.shutdown().await
}

fn build_config(args: &Args) -> Result<ClusterConfig> {
    let mut config = match &args.config {
        Some(path) => ClusterConfig::from_json_file(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => ClusterConfig::default(),
    };
    if let Some(servers) = args.servers {
        config.nb_servers = servers;
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if args.in_memory {
        config.store.backend = StoreBackend::Memory;
    }
    if args.seed.is_some() {
        config.raft.rng_seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}
