//! Cluster-wide workspace status cache.
//!
//! Stores only the current status per workspace id. Transition rules belong
//! to the caller; the cache offers atomic operations, with `replace_if` as
//! the compare-and-swap used for safe transitions across nodes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use che_common::{WorkspaceStatus, validate_field};

use crate::application::ports::{ReplicatedMap, RunningWorkspaces, WorkspaceStopper};
use crate::domain::CacheError;

pub struct WorkspaceStatusCache<M> {
    map: M,
}

fn check_id(workspace_id: &str) -> Result<(), CacheError> {
    validate_field(workspace_id).map_err(|reason| CacheError::InvalidField {
        field: workspace_id.to_string(),
        reason,
    })
}

fn decode(workspace_id: &str, raw: &str) -> Result<WorkspaceStatus, CacheError> {
    raw.parse().map_err(|e: che_common::UnknownStatus| CacheError::Serialization {
        key: workspace_id.to_string(),
        reason: e.to_string(),
    })
}

fn decode_opt(workspace_id: &str, raw: Option<String>) -> Result<Option<WorkspaceStatus>, CacheError> {
    raw.map(|raw| decode(workspace_id, &raw)).transpose()
}

impl<M: ReplicatedMap> WorkspaceStatusCache<M> {
    pub fn new(map: M) -> Self {
        Self { map }
    }

    pub async fn get(&self, workspace_id: &str) -> Result<Option<WorkspaceStatus>, CacheError> {
        check_id(workspace_id)?;
        decode_opt(workspace_id, self.map.get(workspace_id).await?)
    }

    /// Returns the status already stored, `None` if `status` was stored.
    pub async fn put_if_absent(
        &self,
        workspace_id: &str,
        status: WorkspaceStatus,
    ) -> Result<Option<WorkspaceStatus>, CacheError> {
        check_id(workspace_id)?;
        let existing = self.map.put_if_absent(workspace_id, status.as_str()).await?;
        decode_opt(workspace_id, existing)
    }

    /// Overwrites an existing status. Returns the previous one, `None` (and no
    /// write) when the workspace has no status.
    pub async fn replace(
        &self,
        workspace_id: &str,
        status: WorkspaceStatus,
    ) -> Result<Option<WorkspaceStatus>, CacheError> {
        check_id(workspace_id)?;
        let previous = self.map.replace(workspace_id, status.as_str()).await?;
        decode_opt(workspace_id, previous)
    }

    /// Compare-and-swap: succeeds only if the current status is `expected`.
    pub async fn replace_if(
        &self,
        workspace_id: &str,
        expected: WorkspaceStatus,
        status: WorkspaceStatus,
    ) -> Result<bool, CacheError> {
        check_id(workspace_id)?;
        let swapped = self
            .map
            .replace_if(workspace_id, expected.as_str(), status.as_str())
            .await?;
        tracing::debug!(workspace_id, %expected, %status, swapped, "status compare-and-swap");
        Ok(swapped)
    }

    pub async fn remove(&self, workspace_id: &str) -> Result<Option<WorkspaceStatus>, CacheError> {
        check_id(workspace_id)?;
        decode_opt(workspace_id, self.map.remove(workspace_id).await?)
    }

    /// Snapshot of every known status. Unreadable entries are skipped.
    pub async fn as_map(&self) -> Result<BTreeMap<String, WorkspaceStatus>, CacheError> {
        let entries = self.map.entries().await?;
        Ok(entries
            .into_iter()
            .filter_map(|(id, raw)| match decode(&id, &raw) {
                Ok(status) => Some((id, status)),
                Err(e) => {
                    tracing::warn!(workspace_id = %id, error = %e, "skipping malformed status entry");
                    None
                }
            })
            .collect())
    }

    pub async fn shutdown(&self) {
        self.map.shutdown().await;
    }
}

#[async_trait]
impl<M: ReplicatedMap> RunningWorkspaces for WorkspaceStatusCache<M> {
    async fn running(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .as_map()
            .await?
            .into_iter()
            .filter(|(_, status)| *status == WorkspaceStatus::Running)
            .map(|(id, _)| id)
            .collect())
    }
}

/// Stops a workspace by moving it from `RUNNING` to `STOPPING` in the cache;
/// the runtime watching the cache does the rest.
#[async_trait]
impl<M: ReplicatedMap> WorkspaceStopper for WorkspaceStatusCache<M> {
    async fn stop(&self, workspace_id: &str) -> anyhow::Result<()> {
        if self
            .replace_if(workspace_id, WorkspaceStatus::Running, WorkspaceStatus::Stopping)
            .await?
        {
            tracing::info!(workspace_id, "workspace stop requested");
        } else {
            tracing::info!(workspace_id, "workspace not running, nothing to stop");
        }
        Ok(())
    }
}
