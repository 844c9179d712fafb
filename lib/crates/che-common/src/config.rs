use serde::Deserialize;
use std::path::PathBuf;

use crate::cache_keys::{keys, replication};

/// Replicated state connection configuration, read from the YAML file named by
/// `CHE_CACHE_CONFIG`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Valkey connection URL (default: redis://valkey:6379)
    #[serde(default = "default_url")]
    pub url: String,

    /// Deployment name used to namespace keys so several installations can
    /// share one Valkey
    #[serde(default = "default_deployment")]
    pub deployment: String,

    /// ACL username
    #[serde(default)]
    pub username: Option<String>,

    /// ACL password
    #[serde(default)]
    pub password: Option<String>,

    /// Cluster join timeout in milliseconds
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Per-write replication acknowledgement timeout in milliseconds
    #[serde(default = "default_replication_timeout_ms")]
    pub replication_timeout_ms: u64,

    /// Replicas that must acknowledge each write before it completes
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,

    /// Optional mTLS material
    #[serde(default)]
    pub tls: Option<TlsPaths>,
}

/// PEM file locations for an mTLS connection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TlsPaths {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

fn default_url() -> String {
    "redis://valkey:6379".to_string()
}

fn default_deployment() -> String {
    keys::DEFAULT_DEPLOYMENT.to_string()
}

fn default_join_timeout_ms() -> u64 {
    replication::DEFAULT_JOIN_TIMEOUT_MS
}

fn default_replication_timeout_ms() -> u64 {
    replication::DEFAULT_REPLICATION_TIMEOUT_MS
}

fn default_min_replicas() -> u32 {
    replication::DEFAULT_MIN_REPLICAS
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            deployment: default_deployment(),
            username: None,
            password: None,
            join_timeout_ms: default_join_timeout_ms(),
            replication_timeout_ms: default_replication_timeout_ms(),
            min_replicas: default_min_replicas(),
            tls: None,
        }
    }
}
