//! RaftFS Cluster - Running RaftFS processes together
//!
//! - `runtime`: the cooperative poll/tick loop driving one process
//! - `client`: the client driver replaying a command script
//! - `script`: client command script parsing
//! - `console`: operator console commands
//! - `cluster`: in-process cluster over the in-memory message bus

pub mod client;
pub mod cluster;
pub mod console;
pub mod runtime;
pub mod script;

pub use client::{ClientSession, ClientStatus};
pub use cluster::LocalCluster;
pub use console::OperatorCommand;
pub use runtime::run_process;
pub use script::{load_script, parse_script, ClientOp};
