use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a workspace runtime, replicated across the cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl WorkspaceStatus {
    /// Wire representation stored in the replicated map.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown workspace status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for WorkspaceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTING" => Ok(Self::Starting),
            "RUNNING" => Ok(Self::Running),
            "STOPPING" => Ok(Self::Stopping),
            "STOPPED" => Ok(Self::Stopped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Non-fatal issue found while converting or provisioning an environment.
/// `code` is stable so the dashboard can map it to localized text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Warning {
    pub code: i32,
    pub message: String,
}

impl Warning {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Stable warning codes
pub mod warning_codes {
    /// A pod restart policy was replaced by the platform default
    pub const RESTART_POLICY_REWRITTEN: i32 = 4104;

    /// A compose service exists that no machine configuration refers to
    pub const UNUSED_COMPOSE_SERVICE: i32 = 4105;
}

/// A client endpoint interested in server-pushed events for one method
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteSubscriptionContext {
    /// Identifier of the client connection, unique across the cluster
    pub endpoint_id: String,
    /// Filter the subscriber registered with (e.g. `workspaceId`)
    #[serde(default)]
    pub scope: BTreeMap<String, String>,
}

impl RemoteSubscriptionContext {
    pub fn new(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            scope: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.scope.insert(key.into(), value.into());
        self
    }
}

/// Published whenever a workspace changes status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceStatusEvent {
    pub workspace_id: String,
    pub status: WorkspaceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_status: Option<WorkspaceStatus>,
    pub timestamp: DateTime<Utc>,
}

impl WorkspaceStatusEvent {
    pub fn new(workspace_id: impl Into<String>, status: WorkspaceStatus) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            status,
            prev_status: None,
            timestamp: Utc::now(),
        }
    }
}

/// Published when the server saw no running workspace for the whole timeout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerIdleEvent {
    pub timeout_secs: u64,
    pub timestamp: DateTime<Utc>,
}
