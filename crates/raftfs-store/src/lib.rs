//! RaftFS Store - Command execution sink for committed log entries

pub mod commands;
pub mod disk;
pub mod file;
pub mod memory;

pub use commands::*;
pub use disk::*;
pub use file::*;
pub use memory::*;
