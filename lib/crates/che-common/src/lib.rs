pub mod cache_keys;
pub mod config;
pub mod types;

pub use cache_keys::{keys, replication, subscriptions_key, validate_field, workspace_status_key};
pub use config::{ReplicationConfig, TlsPaths};
pub use types::*;
