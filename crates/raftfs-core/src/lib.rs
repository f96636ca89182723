//! RaftFS Core - Core types, errors and configuration shared by every RaftFS crate

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
