//! Configuration types for RaftFS

use crate::error::{RaftFsError, Result};
use crate::types::ProcessId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a RaftFS cluster
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of Raft servers (ids `1..=nb_servers`)
    pub nb_servers: u64,

    /// Root folder holding one working folder per server
    pub data_dir: PathBuf,

    /// Raft configuration
    pub raft: RaftConfig,

    /// Client driver configuration
    pub client: ClientConfig,

    /// Command execution sink configuration
    pub store: StoreConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nb_servers: 3,
            data_dir: PathBuf::from("./server_folders"),
            raft: RaftConfig::default(),
            client: ClientConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| RaftFsError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nb_servers == 0 {
            return Err(RaftFsError::Config("at least one server is required".to_string()));
        }
        self.raft.validate()
    }

    /// Ids of every server in the cluster
    pub fn server_ids(&self) -> Vec<ProcessId> {
        (1..=self.nb_servers).map(ProcessId::new).collect()
    }

    /// Id of the `index`-th client (0-based)
    pub fn client_id(&self, index: usize) -> ProcessId {
        ProcessId::new(self.nb_servers + 1 + index as u64)
    }

    /// Working folder of a server
    pub fn server_dir(&self, id: ProcessId) -> PathBuf {
        self.data_dir.join(format!("server-{}", id.0))
    }
}

/// Raft consensus configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Heartbeat interval
    #[serde(with = "duration_millis")]
    pub heartbeat_interval: Duration,

    /// Minimum election timeout
    #[serde(with = "duration_millis")]
    pub election_timeout_min: Duration,

    /// Maximum election timeout
    #[serde(with = "duration_millis")]
    pub election_timeout_max: Duration,

    /// Pause between two iterations of a process loop
    #[serde(with = "duration_millis")]
    pub loop_interval: Duration,

    /// Seed for the election timeout generator (mixed with the server id)
    pub rng_seed: Option<u64>,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(30),
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
            loop_interval: Duration::from_millis(5),
            rng_seed: None,
        }
    }
}

impl RaftConfig {
    pub fn validate(&self) -> Result<()> {
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(RaftFsError::Config(
                "election_timeout_min must be lower than election_timeout_max".to_string(),
            ));
        }
        if self.heartbeat_interval >= self.election_timeout_min {
            return Err(RaftFsError::Config(
                "heartbeat_interval must be lower than election_timeout_min".to_string(),
            ));
        }
        Ok(())
    }
}

/// Client driver configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time to wait for an answer before retrying against a random server
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(500),
        }
    }
}

/// Where servers keep their files and Raft state
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Everything stays in process memory
    Memory,
    /// Files and Raft state live under `data_dir`
    #[default]
    Disk,
}

/// Command execution sink configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

// Serde helpers for Duration
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClusterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.raft.heartbeat_interval, Duration::from_millis(30));
        assert_eq!(config.server_ids().len(), 3);
        assert_eq!(config.client_id(0), ProcessId::new(4));
    }

    #[test]
    fn test_rejects_inverted_timeouts() {
        let mut config = ClusterConfig::default();
        config.raft.election_timeout_min = Duration::from_millis(400);
        assert!(matches!(config.validate(), Err(RaftFsError::Config(_))));

        let mut config = ClusterConfig::default();
        config.nb_servers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "nb_servers": 5, "raft": {{ "heartbeat_interval": 20 }}, "store": {{ "backend": "memory" }} }}"#
        )
        .unwrap();

        let config = ClusterConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.nb_servers, 5);
        assert_eq!(config.raft.heartbeat_interval, Duration::from_millis(20));
        assert_eq!(config.raft.election_timeout_max, Duration::from_millis(300));
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }
}
