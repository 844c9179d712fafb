//! Runtime infrastructure configuration schema.
//!
//! Pure types and defaults. Loading from the process environment lives in
//! `crate::infra::config`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Host IP used for the `che-host` mapping when none is configured.
pub const DEFAULT_DOCKER_IP: &str = "172.17.0.1";

/// Agent inactivity period after which a workspace is stopped.
pub const DEFAULT_WORKSPACE_IDLE_TIMEOUT_SECS: u64 = 3600;

// ── Enums ────────────────────────────────────────────────────────────────────

/// Orchestration platform the Kubernetes objects target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfraPlatform {
    #[default]
    Kubernetes,
    OpenShift,
}

/// How secure servers are exposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecureExposerKind {
    /// Secure servers are exposed like plain external servers.
    #[default]
    Default,
    /// Secure servers are routed through a per-workspace auth gateway.
    Gateway,
}

// ── Config schema ────────────────────────────────────────────────────────────

/// Infrastructure settings, one field per `CHE_<FIELD>` variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraConfig {
    /// IP of the che master as seen from workspace containers.
    #[serde(default = "default_docker_ip")]
    pub docker_ip: String,

    /// Network every workspace container joins, if any.
    #[serde(default)]
    pub docker_network: Option<String>,

    #[serde(default)]
    pub infra_platform: InfraPlatform,

    /// Host suffix for ingresses and routes.
    #[serde(default)]
    pub ingress_domain: String,

    #[serde(default)]
    pub secure_exposer: SecureExposerKind,

    /// `0` disables the server idle detector.
    #[serde(default)]
    pub server_idle_timeout_secs: u64,

    #[serde(default = "default_workspace_idle_timeout_secs")]
    pub workspace_idle_timeout_secs: u64,

    /// Trace collector endpoint injected into workspace containers.
    #[serde(default)]
    pub tracing_endpoint: Option<String>,

    /// Path to the YAML replication config.
    #[serde(default)]
    pub cache_config: Option<PathBuf>,

    /// Directory holding one machine token file per workspace id.
    #[serde(default)]
    pub machine_token_dir: Option<PathBuf>,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            docker_ip: default_docker_ip(),
            docker_network: None,
            infra_platform: InfraPlatform::default(),
            ingress_domain: String::new(),
            secure_exposer: SecureExposerKind::default(),
            server_idle_timeout_secs: 0,
            workspace_idle_timeout_secs: default_workspace_idle_timeout_secs(),
            tracing_endpoint: None,
            cache_config: None,
            machine_token_dir: None,
        }
    }
}

impl InfraConfig {
    /// Server idle timeout, `None` when disabled.
    #[must_use]
    pub fn server_idle_timeout(&self) -> Option<Duration> {
        (self.server_idle_timeout_secs > 0).then(|| Duration::from_secs(self.server_idle_timeout_secs))
    }

    #[must_use]
    pub fn workspace_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.workspace_idle_timeout_secs)
    }
}

fn default_docker_ip() -> String {
    DEFAULT_DOCKER_IP.to_string()
}

fn default_workspace_idle_timeout_secs() -> u64 {
    DEFAULT_WORKSPACE_IDLE_TIMEOUT_SECS
}
