//! Infrastructure layer: concrete implementations of application port traits.
//!
//! All I/O lives here: environment and file configuration, the Valkey-backed
//! replicated map and machine token files.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::cli` are forbidden.

pub mod config;
pub mod memory_map;
pub mod token;
pub mod valkey;

pub use config::{infra_config_from_vars, load_infra_config, load_replication_config};
pub use memory_map::InMemoryReplicatedMap;
pub use token::FileMachineTokenProvider;
pub use valkey::ValkeyReplicatedMap;
